use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{
        ArtistDetailType, ArtistRankType, ChartDetailType, ChartEntryDetailType, CountryClusterDetailType, CountryDetailType, CountryDevelopmentOutputType, CountryPotentialType,
        ExportPotentialOutputType, UserDetailType,
    },
};

/***************** Authentication models *********************/

/**
 * Login request with the email as identifier.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    pub email: String,
    pub password: String,
}

/**
 * Login response carrying the token pair and the authenticated user.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserResponse,
}

/**
 * Request carrying a refresh token, used by both refresh and logout.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh: String,
}

/**
 * Response to a token refresh.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access: String,
}

/***************** User models *********************/

/**
 * Request structure for creating a user. `artist_id` is required when
 * the role is artist.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAddRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub artist_id: Option<i64>,
}

/**
 * Request structure for partially updating a user.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/**
 * Request structure for changing the role of a user.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRoleRequest {
    pub role: String,
}

/**
 * Response structure for a user with its optional artist profile.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub role: String,
    pub artist_profile: Option<ArtistResponse>,
}

impl From<UserDetailType> for UserResponse {
    fn from(user: UserDetailType) -> Self {
        UserResponse { id: user.id, email: user.email, username: user.username, role: user.role.as_str().to_string(), artist_profile: user.artist_profile.map(ArtistResponse::from) }
    }
}

/***************** Artist models *********************/

/**
 * Request structure for creating an artist.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistAddRequest {
    pub name: String,
    pub nationality: String,
    pub manager_id: Option<i64>,
}

/**
 * Request structure for partially updating an artist.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistUpdateRequest {
    pub name: Option<String>,
    pub nationality: Option<String>,
    pub manager_id: Option<i64>,
}

/**
 * Response structure for an artist. `manager_name` is the denormalized
 * username of the managing user.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistResponse {
    pub id: i64,
    pub name: String,
    pub nationality: String,
    pub user_id: Option<i64>,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
}

impl From<ArtistDetailType> for ArtistResponse {
    fn from(artist: ArtistDetailType) -> Self {
        ArtistResponse { id: artist.id, name: artist.name, nationality: artist.nationality, user_id: artist.user_id, manager_id: artist.manager_id, manager_name: artist.manager_name }
    }
}

/***************** Country models *********************/

/**
 * Request structure for creating or replacing a country.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryRequest {
    pub iso2: String,
    pub internet_users: f64,
    pub population: i64,
}

/**
 * Response structure for a country.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryResponse {
    pub iso2: String,
    pub internet_users: f64,
    pub population: i64,
}

impl From<CountryDetailType> for CountryResponse {
    fn from(country: CountryDetailType) -> Self {
        CountryResponse { iso2: country.iso2, internet_users: country.internet_users, population: country.population }
    }
}

/***************** Chart models *********************/

/**
 * Request structure for creating a chart.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartAddRequest {
    pub country_iso2: String,
}

/**
 * Response structure for a chart with its country and entries nested.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    pub id: i64,
    pub country: CountryResponse,
    pub entries: Vec<ChartEntryResponse>,
}

impl From<ChartDetailType> for ChartResponse {
    fn from(chart: ChartDetailType) -> Self {
        ChartResponse { id: chart.id, country: CountryResponse::from(chart.country), entries: chart.entries.into_iter().map(ChartEntryResponse::from).collect() }
    }
}

/**
 * Response structure for the distinct chart countries.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartCountriesResponse {
    pub countries: Vec<String>,
}

/***************** Chart entry models *********************/

/**
 * Request structure for creating a chart entry.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntryAddRequest {
    pub chart_id: i64,
    pub artist_id: i64,
    pub rank: i32,
}

/**
 * Request structure for the rank upsert. The artist is resolved from the
 * login user of the caller.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntryUpsertRequest {
    pub chart_id: i64,
    pub rank: i32,
}

/**
 * Response structure for a chart entry. `country_iso2` is the
 * denormalized country of the chart.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntryResponse {
    pub id: i64,
    pub chart_id: i64,
    pub country_iso2: String,
    pub artist: ArtistResponse,
    pub rank: i32,
}

impl From<ChartEntryDetailType> for ChartEntryResponse {
    fn from(entry: ChartEntryDetailType) -> Self {
        ChartEntryResponse { id: entry.id, chart_id: entry.chart_id, country_iso2: entry.country_iso2, artist: ArtistResponse::from(entry.artist), rank: entry.rank }
    }
}

/***************** Cluster models *********************/

/**
 * Request structure for assigning a cluster label to a country.
 */
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAddRequest {
    pub country_iso2: String,
    pub cluster: String,
}

/**
 * Response structure for a country cluster.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResponse {
    pub country: CountryResponse,
    pub cluster: String,
}

impl From<CountryClusterDetailType> for ClusterResponse {
    fn from(cluster: CountryClusterDetailType) -> Self {
        ClusterResponse { country: CountryResponse::from(cluster.country), cluster: cluster.cluster.as_str().to_string() }
    }
}

/***************** Analysis models *********************/

/**
 * Response structure for the country development analysis.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevelopmentResponse {
    pub country: CountryResponse,
    pub cluster: String,
    pub artist_count: i64,
    pub chart_count: i64,
}

impl From<CountryDevelopmentOutputType> for DevelopmentResponse {
    fn from(output: CountryDevelopmentOutputType) -> Self {
        DevelopmentResponse { country: CountryResponse::from(output.country), cluster: output.cluster.as_str().to_string(), artist_count: output.artist_count, chart_count: output.chart_count }
    }
}

/**
 * Response structure for the export potential analysis.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPotentialResponse {
    pub artist: ArtistResponse,
    pub foreign_chart_entries: i64,
    pub countries: Vec<CountryPotentialResponse>,
}

impl From<ExportPotentialOutputType> for ExportPotentialResponse {
    fn from(output: ExportPotentialOutputType) -> Self {
        ExportPotentialResponse {
            artist: ArtistResponse::from(output.artist),
            foreign_chart_entries: output.foreign_chart_entries,
            countries: output.countries.into_iter().map(CountryPotentialResponse::from).collect(),
        }
    }
}

/**
 * One destination country of the export potential with the charting
 * peers and their best rank.
 */
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryPotentialResponse {
    pub country: String,
    pub artists: Vec<ArtistRankResponse>,
}

impl From<CountryPotentialType> for CountryPotentialResponse {
    fn from(potential: CountryPotentialType) -> Self {
        CountryPotentialResponse { country: potential.country, artists: potential.artists.into_iter().map(ArtistRankResponse::from).collect() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistRankResponse {
    pub name: String,
    pub rank: i32,
}

impl From<ArtistRankType> for ArtistRankResponse {
    fn from(rank: ArtistRankType) -> Self {
        ArtistRankResponse { name: rank.name, rank: rank.rank }
    }
}

/***************** Error models *********************/

/**
 * Custom error response for the application.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * The error code associated with the error type.
     */
    pub code: u16,
    /**
     * A human-readable message describing the error.
     */
    pub error: String,
}

impl ResponseError for ApplicationError {
    /**
     * Generates an error response for the application error.
     */
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse { code: get_error_code(&self.error_type), error: self.message.clone() };
        HttpResponse::build(get_statuscode(&self.error_type)).json(&error_response)
    }
}

/**
 * Maps application errors to HTTP status codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding HTTP status code.
 */
fn get_statuscode(application_error: &ErrorType) -> StatusCode {
    match application_error {
        ErrorType::Validation | ErrorType::NotFound | ErrorType::ConstraintViolation => StatusCode::BAD_REQUEST,
        ErrorType::JwtAuthorization => StatusCode::UNAUTHORIZED,
        ErrorType::Forbidden => StatusCode::FORBIDDEN,
        ErrorType::Initialization | ErrorType::DatabaseError | ErrorType::Application => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/**
 * Maps application errors to error codes.
 *
 * # Arguments
 * `application_error`: The type of error that occurred.
 *
 * # Returns
 * The corresponding error code.
 */
fn get_error_code(application_error: &ErrorType) -> u16 {
    match application_error {
        ErrorType::JwtAuthorization => 1000,
        ErrorType::Initialization => 1001,
        ErrorType::Forbidden => 1002,
        ErrorType::DatabaseError => 1003,
        ErrorType::Validation => 1004,
        ErrorType::NotFound => 1005,
        ErrorType::ConstraintViolation => 1006,
        ErrorType::Application => 1007,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::models::{ClusterLabel, Role};

    #[test]
    fn test_statuscode_mapping() {
        assert_eq!(get_statuscode(&ErrorType::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(get_statuscode(&ErrorType::NotFound), StatusCode::BAD_REQUEST);
        assert_eq!(get_statuscode(&ErrorType::ConstraintViolation), StatusCode::BAD_REQUEST);
        assert_eq!(get_statuscode(&ErrorType::JwtAuthorization), StatusCode::UNAUTHORIZED);
        assert_eq!(get_statuscode(&ErrorType::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(get_statuscode(&ErrorType::DatabaseError), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_user_response_from_detail() {
        let artist = ArtistDetailType::new(3, "Stromae".to_string(), "BE".to_string(), Some(9), Some(2), Some("manager1".to_string()));
        let user = UserDetailType::new(9, "a@b.c".to_string(), "stromae".to_string(), Role::Artist, Some(artist));
        let response = UserResponse::from(user);
        assert_eq!(response.role, "artist");
        let profile = response.artist_profile.unwrap();
        assert_eq!(profile.manager_name.as_deref(), Some("manager1"));
    }

    #[test]
    fn test_chart_response_nesting() {
        let artist = ArtistDetailType::new(3, "Stromae".to_string(), "BE".to_string(), None, None, None);
        let entry = ChartEntryDetailType::new(11, 4, "FR".to_string(), artist, 2);
        let chart = ChartDetailType::new(4, CountryDetailType::new("FR".to_string(), 85.3, 67000000), vec![entry]);
        let response = ChartResponse::from(chart);
        assert_eq!(response.country.iso2, "FR");
        assert_eq!(response.entries[0].country_iso2, "FR");
        assert_eq!(response.entries[0].artist.name, "Stromae");
    }

    #[test]
    fn test_cluster_response_label() {
        let cluster = CountryClusterDetailType::new(CountryDetailType::new("IN".to_string(), 43.0, 1380000000), ClusterLabel::Potential);
        let response = ClusterResponse::from(cluster);
        assert_eq!(response.cluster, "POTENTIAL");
    }
}
