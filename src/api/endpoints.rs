use actix_web::{
    HttpRequest, HttpResponse, delete, get, patch, post, put,
    web::{self, Path},
};
use tracing::{Instrument, instrument};

use crate::{
    api::{
        permissions::{self, ArtistAction, ChartAction, ChartEntryAction, ClusterAction, CountryAction, UserAction, ensure},
        rest::{
            ArtistAddRequest, ArtistResponse, ArtistUpdateRequest, AssignRoleRequest, AuthenticateRequest, AuthenticateResponse, ChartAddRequest, ChartCountriesResponse,
            ChartEntryAddRequest, ChartEntryResponse, ChartEntryUpsertRequest, ChartResponse, ClusterAddRequest, ClusterResponse, CountryRequest, CountryResponse, DevelopmentResponse,
            ExportPotentialResponse, RefreshTokenRequest, RefreshTokenResponse, UserAddRequest, UserResponse, UserUpdateRequest,
        },
        state::AppState,
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{
            ArtistAddInputType, ArtistUpdateInputType, ChartEntryAddInputType, ChartEntryUpsertInputType, ClusterAddInputType, ClusterLabel, CountryAddInputType, Role, UserAddInputType,
            UserUpdateInputType,
        },
    },
};

/***************** Authentication endpoints *********************/

/**
 * Endpoint to authenticate with email and password, issuing a token pair.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "authenticate", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/users/authenticate")]
pub async fn authenticate(http_request: HttpRequest, request_body: web::Json<AuthenticateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let request_body = request_body.into_inner();
    let user = app_state.user_service.verify_credentials(&request_body.email, &request_body.password).instrument(span).await?;
    let pair = app_state.jwt_service.issue_pair(&user)?;
    Ok(HttpResponse::Ok().json(AuthenticateResponse { access: pair.access, refresh: pair.refresh, user: UserResponse::from(user) }))
}

/**
 * Endpoint to exchange a refresh token for a fresh access token.
 * Blacklisted refresh tokens are rejected.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "refreshToken", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/token/refresh")]
pub async fn token_refresh(http_request: HttpRequest, request_body: web::Json<RefreshTokenRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.decode_refresh(&request_body.refresh)?;
    if app_state.user_service.is_refresh_token_blacklisted(claim.jti()?).instrument(span.clone()).await? {
        return Err(ApplicationError::new(ErrorType::Validation, "Invalid or expired token".to_string()));
    }
    let user = app_state.user_service.get_user(claim.sub).instrument(span).await?;
    let access = app_state.jwt_service.issue_access(&user)?;
    Ok(HttpResponse::Ok().json(RefreshTokenResponse { access }))
}

/**
 * Endpoint to log out by blacklisting the refresh token. The refresh
 * token itself is the credential, so an expired access token does not
 * prevent the logout.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "logout", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/users/logout")]
pub async fn logout(http_request: HttpRequest, request_body: web::Json<RefreshTokenRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.decode_refresh(&request_body.refresh)?;
    app_state.user_service.blacklist_refresh_token(claim.jti()?).instrument(span).await?;
    Ok(HttpResponse::Ok().finish())
}

/***************** User endpoints *********************/

/**
 * Endpoint to create a user.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "addUser", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/users")]
pub async fn users_add(http_request: HttpRequest, request_body: web::Json<UserAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::user_has_permission(claim.role()?, UserAction::Create))?;
    let request_body = request_body.into_inner();
    let role = Role::parse(&request_body.role)?;
    let user_add_input = UserAddInputType::new(request_body.email, request_body.username, request_body.password, role, request_body.artist_id).validate()?;
    let user = app_state.user_service.create_user(user_add_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(UserResponse::from(user)))
}

/**
 * Endpoint to retrieve all users.
 */
#[instrument(skip(http_request, app_state), fields(service = "listUsers", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/users")]
pub async fn users_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::user_has_permission(claim.role()?, UserAction::List))?;
    let users = app_state.user_service.get_user_list().instrument(span).await?;
    Ok(HttpResponse::Ok().json(users.into_iter().map(UserResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint to retrieve the authenticated user.
 */
#[instrument(skip(http_request, app_state), fields(service = "currentUser", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/users/me")]
pub async fn users_me(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::user_has_permission(claim.role()?, UserAction::Me))?;
    let user = app_state.user_service.get_user(claim.sub).instrument(span).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/**
 * Endpoint to retrieve a user. Non-admins only reach their own account.
 */
#[instrument(skip(http_request, app_state), fields(service = "getUser", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/users/{userId}")]
pub async fn users_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let user_id = path.into_inner();
    ensure(permissions::user_has_permission(claim.role()?, UserAction::Retrieve))?;
    ensure(permissions::user_has_object_permission(claim.role()?, claim.sub, user_id))?;
    let user = app_state.user_service.get_user(user_id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/**
 * Endpoint to partially update a user.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "updateUser", trace_id = get_trace_id(&http_request), result))]
#[patch("/api/v1_0/users/{userId}")]
pub async fn users_update(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<UserUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let user_id = path.into_inner();
    ensure(permissions::user_has_permission(claim.role()?, UserAction::Update))?;
    ensure(permissions::user_has_object_permission(claim.role()?, claim.sub, user_id))?;
    let request_body = request_body.into_inner();
    let user_update_input = UserUpdateInputType { email: request_body.email, username: request_body.username, password: request_body.password }.validate()?;
    let user = app_state.user_service.update_user(user_id, user_update_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/**
 * Endpoint to delete a user.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteUser", trace_id = get_trace_id(&http_request), result))]
#[delete("/api/v1_0/users/{userId}")]
pub async fn users_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::user_has_permission(claim.role()?, UserAction::Delete))?;
    app_state.user_service.delete_user(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/**
 * Endpoint to change the role of a user. Assigning the artist role
 * creates an empty artist profile when the user has none.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "assignRole", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/users/{userId}/assign_role")]
pub async fn users_assign_role(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<AssignRoleRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::user_has_permission(claim.role()?, UserAction::AssignRole))?;
    let role = Role::parse(&request_body.role)?;
    let user = app_state.user_service.assign_role(path.into_inner(), role).instrument(span).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(user)))
}

/***************** Artist endpoints *********************/

/**
 * Endpoint to create an artist.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "addArtist", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/artists")]
pub async fn artists_add(http_request: HttpRequest, request_body: web::Json<ArtistAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::artist_has_permission(claim.role()?, ArtistAction::Create))?;
    let request_body = request_body.into_inner();
    let artist_add_input = ArtistAddInputType { name: request_body.name, nationality: request_body.nationality, manager_id: request_body.manager_id }.validate()?;
    let artist = app_state.artist_service.create_artist(artist_add_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(ArtistResponse::from(artist)))
}

/**
 * Endpoint to retrieve artists. Managers get the artists they manage,
 * everyone else the full list.
 */
#[instrument(skip(http_request, app_state), fields(service = "listArtists", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/artists")]
pub async fn artists_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let role = claim.role()?;
    ensure(permissions::artist_has_permission(role, ArtistAction::List))?;
    let artists = match role {
        Role::Manager => app_state.artist_service.get_artist_list_for_manager(claim.sub).instrument(span).await?,
        _ => app_state.artist_service.get_artist_list().instrument(span).await?,
    };
    Ok(HttpResponse::Ok().json(artists.into_iter().map(ArtistResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint to retrieve the artist profile of the authenticated user.
 */
#[instrument(skip(http_request, app_state), fields(service = "currentArtist", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/artists/me")]
pub async fn artists_me(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::artist_has_permission(claim.role()?, ArtistAction::Me))?;
    let artist = app_state.artist_service.get_artist_for_user(claim.sub).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ArtistResponse::from(artist)))
}

/**
 * Endpoint to retrieve the distinct nationalities across all artists.
 */
#[instrument(skip(http_request, app_state), fields(service = "listNationalities", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/artists/nationalities")]
pub async fn artists_nationalities(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::artist_has_permission(claim.role()?, ArtistAction::Nationalities))?;
    let nationalities = app_state.artist_service.get_nationalities().instrument(span).await?;
    Ok(HttpResponse::Ok().json(nationalities))
}

/**
 * Endpoint to retrieve an artist.
 */
#[instrument(skip(http_request, app_state), fields(service = "getArtist", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/artists/{artistId}")]
pub async fn artists_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let role = claim.role()?;
    ensure(permissions::artist_has_permission(role, ArtistAction::Retrieve))?;
    let artist = app_state.artist_service.get_artist(path.into_inner()).instrument(span).await?;
    ensure(permissions::artist_has_object_permission(role, claim.sub, ArtistAction::Retrieve, &artist))?;
    Ok(HttpResponse::Ok().json(ArtistResponse::from(artist)))
}

/**
 * Endpoint to partially update an artist.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "updateArtist", trace_id = get_trace_id(&http_request), result))]
#[patch("/api/v1_0/artists/{artistId}")]
pub async fn artists_update(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<ArtistUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let role = claim.role()?;
    let artist_id = path.into_inner();
    ensure(permissions::artist_has_permission(role, ArtistAction::Update))?;
    let artist = app_state.artist_service.get_artist(artist_id).instrument(span.clone()).await?;
    ensure(permissions::artist_has_object_permission(role, claim.sub, ArtistAction::Update, &artist))?;
    let request_body = request_body.into_inner();
    let artist_update_input = ArtistUpdateInputType { name: request_body.name, nationality: request_body.nationality, manager_id: request_body.manager_id }.validate()?;
    let artist = app_state.artist_service.update_artist(artist_id, artist_update_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ArtistResponse::from(artist)))
}

/**
 * Endpoint to delete an artist.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteArtist", trace_id = get_trace_id(&http_request), result))]
#[delete("/api/v1_0/artists/{artistId}")]
pub async fn artists_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::artist_has_permission(claim.role()?, ArtistAction::Delete))?;
    app_state.artist_service.delete_artist(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/**
 * Endpoint to retrieve the chart entries of an artist.
 */
#[instrument(skip(http_request, app_state), fields(service = "artistPerformance", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/artists/{artistId}/performance")]
pub async fn artists_performance(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let role = claim.role()?;
    let artist_id = path.into_inner();
    ensure(permissions::artist_has_permission(role, ArtistAction::Performance))?;
    let artist = app_state.artist_service.get_artist(artist_id).instrument(span.clone()).await?;
    ensure(permissions::artist_has_object_permission(role, claim.sub, ArtistAction::Performance, &artist))?;
    let entries = app_state.artist_service.get_performance(artist_id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(entries.into_iter().map(ChartEntryResponse::from).collect::<Vec<_>>()))
}

/***************** Country endpoints *********************/

/**
 * Endpoint to create a country.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "addCountry", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/countries")]
pub async fn countries_add(http_request: HttpRequest, request_body: web::Json<CountryRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::country_has_permission(claim.role()?, CountryAction::Create))?;
    let request_body = request_body.into_inner();
    let country_add_input = CountryAddInputType { iso2: request_body.iso2, internet_users: request_body.internet_users, population: request_body.population }.validate()?;
    let country = app_state.country_service.create_country(country_add_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(CountryResponse::from(country)))
}

/**
 * Endpoint to retrieve all countries.
 */
#[instrument(skip(http_request, app_state), fields(service = "listCountries", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/countries")]
pub async fn countries_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::country_has_permission(claim.role()?, CountryAction::List))?;
    let countries = app_state.country_service.get_country_list().instrument(span).await?;
    Ok(HttpResponse::Ok().json(countries.into_iter().map(CountryResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint to retrieve a country.
 */
#[instrument(skip(http_request, app_state), fields(service = "getCountry", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/countries/{iso2}")]
pub async fn countries_get(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::country_has_permission(claim.role()?, CountryAction::Retrieve))?;
    let country = app_state.country_service.get_country(&path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CountryResponse::from(country)))
}

/**
 * Endpoint to replace the statistics of a country.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "updateCountry", trace_id = get_trace_id(&http_request), result))]
#[put("/api/v1_0/countries/{iso2}")]
pub async fn countries_update(path: Path<String>, http_request: HttpRequest, request_body: web::Json<CountryRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::country_has_permission(claim.role()?, CountryAction::Update))?;
    let request_body = request_body.into_inner();
    let country_input = CountryAddInputType { iso2: path.into_inner(), internet_users: request_body.internet_users, population: request_body.population }.validate()?;
    let country = app_state.country_service.update_country(country_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CountryResponse::from(country)))
}

/**
 * Endpoint to delete a country. Its chart and cluster cascade.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteCountry", trace_id = get_trace_id(&http_request), result))]
#[delete("/api/v1_0/countries/{iso2}")]
pub async fn countries_delete(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::country_has_permission(claim.role()?, CountryAction::Delete))?;
    app_state.country_service.delete_country(&path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/***************** Chart endpoints *********************/

/**
 * Endpoint to create a chart for a country.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "addChart", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/charts")]
pub async fn charts_add(http_request: HttpRequest, request_body: web::Json<ChartAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_has_permission(claim.role()?, ChartAction::Create))?;
    let chart = app_state.chart_service.create_chart(&request_body.country_iso2).instrument(span).await?;
    Ok(HttpResponse::Created().json(ChartResponse::from(chart)))
}

/**
 * Endpoint to retrieve all charts with their entries.
 */
#[instrument(skip(http_request, app_state), fields(service = "listCharts", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/charts")]
pub async fn charts_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_has_permission(claim.role()?, ChartAction::List))?;
    let charts = app_state.chart_service.get_chart_list().instrument(span).await?;
    Ok(HttpResponse::Ok().json(charts.into_iter().map(ChartResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint to retrieve the distinct countries that have a chart.
 */
#[instrument(skip(http_request, app_state), fields(service = "listChartCountries", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/charts/countries")]
pub async fn charts_countries(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_has_permission(claim.role()?, ChartAction::Countries))?;
    let countries = app_state.chart_service.get_chart_countries().instrument(span).await?;
    Ok(HttpResponse::Ok().json(ChartCountriesResponse { countries }))
}

/**
 * Endpoint to retrieve the charts of a country.
 */
#[instrument(skip(http_request, app_state), fields(service = "chartsByCountry", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/charts/country/{iso2}")]
pub async fn charts_by_country(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_has_permission(claim.role()?, ChartAction::ByCountry))?;
    let charts = app_state.chart_service.get_charts_by_country(&path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(charts.into_iter().map(ChartResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint to retrieve a chart with its entries.
 */
#[instrument(skip(http_request, app_state), fields(service = "getChart", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/charts/{chartId}")]
pub async fn charts_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_has_permission(claim.role()?, ChartAction::Retrieve))?;
    let chart = app_state.chart_service.get_chart(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ChartResponse::from(chart)))
}

/**
 * Endpoint to delete a chart. Its entries cascade.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteChart", trace_id = get_trace_id(&http_request), result))]
#[delete("/api/v1_0/charts/{chartId}")]
pub async fn charts_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_has_permission(claim.role()?, ChartAction::Delete))?;
    app_state.chart_service.delete_chart(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/***************** Chart entry endpoints *********************/

/**
 * Endpoint to create a chart entry.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "addChartEntry", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/chart-entries")]
pub async fn chart_entries_add(http_request: HttpRequest, request_body: web::Json<ChartEntryAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_entry_has_permission(claim.role()?, claim.sub, ChartEntryAction::Create))?;
    let request_body = request_body.into_inner();
    let entry_add_input = ChartEntryAddInputType { chart_id: request_body.chart_id, artist_id: request_body.artist_id, rank: request_body.rank }.validate()?;
    let entry = app_state.chart_service.create_entry(entry_add_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(ChartEntryResponse::from(entry)))
}

/**
 * Endpoint to retrieve all chart entries.
 */
#[instrument(skip(http_request, app_state), fields(service = "listChartEntries", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/chart-entries")]
pub async fn chart_entries_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_entry_has_permission(claim.role()?, claim.sub, ChartEntryAction::List))?;
    let entries = app_state.chart_service.get_entry_list().instrument(span).await?;
    Ok(HttpResponse::Ok().json(entries.into_iter().map(ChartEntryResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint to retrieve the chart entries of every artist managed by a
 * manager. Open to admins and the manager itself.
 */
#[instrument(skip(http_request, app_state), fields(service = "chartEntriesByManager", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/chart-entries/by-manager/{managerId}")]
pub async fn chart_entries_by_manager(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let manager_id = path.into_inner();
    ensure(permissions::chart_entry_has_permission(claim.role()?, claim.sub, ChartEntryAction::ByManager { manager_id }))?;
    let entries = app_state.chart_service.get_entries_for_manager(manager_id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(entries.into_iter().map(ChartEntryResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint to retrieve the chart entries of the artist linked to a login
 * user. Open to admins and the artist login itself.
 */
#[instrument(skip(http_request, app_state), fields(service = "chartEntriesByArtist", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/chart-entries/by-artist/{userId}")]
pub async fn chart_entries_by_artist(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    let user_id = path.into_inner();
    ensure(permissions::chart_entry_has_permission(claim.role()?, claim.sub, ChartEntryAction::ByArtist { user_id }))?;
    let entries = app_state.chart_service.get_entries_for_artist_user(user_id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(entries.into_iter().map(ChartEntryResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint for an artist login to insert or update its own rank within
 * a chart.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "upsertChartEntry", trace_id = get_trace_id(&http_request), result))]
#[put("/api/v1_0/chart-entries/update_entry")]
pub async fn chart_entries_upsert(http_request: HttpRequest, request_body: web::Json<ChartEntryUpsertRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_entry_has_permission(claim.role()?, claim.sub, ChartEntryAction::UpdateEntry))?;
    let upsert_input = ChartEntryUpsertInputType { chart_id: request_body.chart_id, artist_user_id: claim.sub, rank: request_body.rank }.validate()?;
    let entry = app_state.chart_service.upsert_entry(upsert_input).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ChartEntryResponse::from(entry)))
}

/**
 * Endpoint to retrieve a chart entry.
 */
#[instrument(skip(http_request, app_state), fields(service = "getChartEntry", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/chart-entries/{entryId}")]
pub async fn chart_entries_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_entry_has_permission(claim.role()?, claim.sub, ChartEntryAction::Retrieve))?;
    let entry = app_state.chart_service.get_entry(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ChartEntryResponse::from(entry)))
}

/**
 * Endpoint to delete a chart entry.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteChartEntry", trace_id = get_trace_id(&http_request), result))]
#[delete("/api/v1_0/chart-entries/{entryId}")]
pub async fn chart_entries_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::chart_entry_has_permission(claim.role()?, claim.sub, ChartEntryAction::Delete))?;
    app_state.chart_service.delete_entry(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/***************** Cluster endpoints *********************/

/**
 * Endpoint to assign a cluster label to a country.
 */
#[instrument(skip(http_request, request_body, app_state), fields(service = "addCluster", trace_id = get_trace_id(&http_request), result))]
#[post("/api/v1_0/country-clusters")]
pub async fn clusters_add(http_request: HttpRequest, request_body: web::Json<ClusterAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::cluster_has_permission(claim.role()?, ClusterAction::Create))?;
    let request_body = request_body.into_inner();
    let cluster = ClusterLabel::parse(&request_body.cluster)?;
    let cluster_add_input = ClusterAddInputType { country_iso2: request_body.country_iso2, cluster }.validate()?;
    let cluster = app_state.country_service.create_cluster(cluster_add_input).instrument(span).await?;
    Ok(HttpResponse::Created().json(ClusterResponse::from(cluster)))
}

/**
 * Endpoint to retrieve all country clusters.
 */
#[instrument(skip(http_request, app_state), fields(service = "listClusters", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/country-clusters")]
pub async fn clusters_list(http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::cluster_has_permission(claim.role()?, ClusterAction::List))?;
    let clusters = app_state.country_service.get_cluster_list().instrument(span).await?;
    Ok(HttpResponse::Ok().json(clusters.into_iter().map(ClusterResponse::from).collect::<Vec<_>>()))
}

/**
 * Endpoint for the country development analysis.
 */
#[instrument(skip(http_request, app_state), fields(service = "countryDevelopment", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/country-clusters/development/{iso2}")]
pub async fn clusters_development(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::cluster_has_permission(claim.role()?, ClusterAction::Development))?;
    let development = app_state.analysis_service.country_development(&path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(DevelopmentResponse::from(development)))
}

/**
 * Endpoint to retrieve the cluster of a country.
 */
#[instrument(skip(http_request, app_state), fields(service = "getCluster", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/country-clusters/{iso2}")]
pub async fn clusters_get(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::cluster_has_permission(claim.role()?, ClusterAction::Retrieve))?;
    let cluster = app_state.country_service.get_cluster(&path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ClusterResponse::from(cluster)))
}

/**
 * Endpoint to delete the cluster of a country.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteCluster", trace_id = get_trace_id(&http_request), result))]
#[delete("/api/v1_0/country-clusters/{iso2}")]
pub async fn clusters_delete(path: Path<String>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::cluster_has_permission(claim.role()?, ClusterAction::Delete))?;
    app_state.country_service.delete_cluster(&path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::NoContent().finish())
}

/***************** Export analysis endpoints *********************/

/**
 * Endpoint for the export potential analysis of an artist.
 */
#[instrument(skip(http_request, app_state), fields(service = "exportPotential", trace_id = get_trace_id(&http_request), result))]
#[get("/api/v1_0/export-analysis/potential/{artistId}")]
pub async fn export_potential(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let claim = app_state.jwt_service.validate(&http_request)?;
    ensure(permissions::export_analysis_has_permission(claim.role()?))?;
    let potential = app_state.analysis_service.export_potential(path.into_inner()).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ExportPotentialResponse::from(potential)))
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID").and_then(|v| v.to_str().ok().map(std::string::ToString::to_string)).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod test {
    use actix_web::{App, http::StatusCode, test::TestRequest};

    use super::*;
    use crate::{
        api::security::JwtSecurityService,
        dao::{artists::ArtistDao, charts::ChartDao, clusters::ClusterDao, countries::CountryDao, tokens::TokenDao, users::UserDao},
        model::config::AuthConfig,
        service::{analysis::ExportAnalysisService, artists::ArtistService, charts::ChartService, countries::CountryService, users::UserService},
    };

    #[actix_web::test]
    async fn test_logout_authenticates_by_refresh_token_alone() {
        let app = actix_web::test::init_service(App::new().app_data(web::Data::new(test_app_state())).service(logout)).await;
        // No Authorization header: the refresh token in the body is the only credential,
        // so a bad one must fail validation rather than authorization
        let request = TestRequest::post().uri("/api/v1_0/users/logout").set_json(serde_json::json!({ "refresh": "not-a-token" })).to_request();
        let response = actix_web::test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    /**
     * Builds an application state around a lazy pool. The pool is never
     * connected by the tests using it.
     */
    fn test_app_state() -> AppState {
        let pool = sqlx::Pool::<sqlx::Postgres>::connect_lazy("postgres://localhost:5432/test").unwrap();
        let auth_config = AuthConfig { secret: "test-secret".to_string(), access_token_lifetime_secs: 300, refresh_token_lifetime_secs: 86400 };
        AppState::new(
            JwtSecurityService::new(&auth_config).unwrap(),
            UserService::new(UserDao::new(), ArtistDao::new(), CountryDao::new(), TokenDao::new(), pool.clone()),
            ArtistService::new(ArtistDao::new(), ChartDao::new(), UserDao::new(), pool.clone()),
            ChartService::new(ChartDao::new(), CountryDao::new(), ArtistDao::new(), UserDao::new(), pool.clone()),
            CountryService::new(CountryDao::new(), ClusterDao::new(), pool.clone()),
            ExportAnalysisService::new(ArtistDao::new(), ChartDao::new(), ClusterDao::new(), pool),
        )
    }

    #[actix_web::test]
    async fn test_get_trace_id_exists() {
        let request = TestRequest::default().insert_header(("X-Trace-ID", "test")).to_http_request();
        let trace_id = get_trace_id(&request);
        assert_eq!(trace_id, "test");
    }

    #[actix_web::test]
    async fn test_get_trace_id_not_exists() {
        let request = TestRequest::default().to_http_request();
        let trace_id = get_trace_id(&request);
        assert!(!trace_id.is_empty());
    }
}
