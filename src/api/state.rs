use crate::{
    api::security::JwtSecurityService,
    service::{analysis::ExportAnalysisService, artists::ArtistService, charts::ChartService, countries::CountryService, users::UserService},
};

/**
 * Represents the application state shared across the Actix web application.
 */
pub struct AppState {
    /**
     * The JWT security service for handling authentication and authorization.
     */
    pub jwt_service: JwtSecurityService,
    /**
     * The service for users, credentials and the refresh token denylist.
     */
    pub user_service: UserService,
    /**
     * The service for artists.
     */
    pub artist_service: ArtistService,
    /**
     * The service for charts and chart entries.
     */
    pub chart_service: ChartService,
    /**
     * The service for countries and their cluster labels.
     */
    pub country_service: CountryService,
    /**
     * The service for the analytical queries.
     */
    pub analysis_service: ExportAnalysisService,
}

/**
 * Creates a new instance of `AppState`.
 */
impl AppState {
    pub fn new(
        jwt_service: JwtSecurityService,
        user_service: UserService,
        artist_service: ArtistService,
        chart_service: ChartService,
        country_service: CountryService,
        analysis_service: ExportAnalysisService,
    ) -> Self {
        AppState { jwt_service, user_service, artist_service, chart_service, country_service, analysis_service }
    }
}
