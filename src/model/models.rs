use crate::model::apperror::{ApplicationError, ErrorType};

/**
 * Role assigned to a login account.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Artist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Artist => "artist",
        }
    }

    /**
     * Parses a role string, failing validation for unknown roles.
     */
    pub fn parse(value: &str) -> Result<Self, ApplicationError> {
        match value {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "artist" => Ok(Role::Artist),
            other => Err(ApplicationError::new(ErrorType::Validation, format!("Unknown role: {other}"))),
        }
    }
}

/**
 * Market maturity label assigned to a country.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLabel {
    Mature,
    Potential,
}

impl ClusterLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterLabel::Mature => "MATURE",
            ClusterLabel::Potential => "POTENTIAL",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ApplicationError> {
        match value {
            "MATURE" => Ok(ClusterLabel::Mature),
            "POTENTIAL" => Ok(ClusterLabel::Potential),
            other => Err(ApplicationError::new(ErrorType::Validation, format!("Unknown cluster label: {other}"))),
        }
    }

    /**
     * Maps a numeric cluster id from the clusters dataset to a label.
     * Ids outside 0..=3 are a fatal load error.
     */
    pub fn from_dataset_id(id: i64) -> Result<Self, ApplicationError> {
        match id {
            0 => Ok(ClusterLabel::Potential),
            1 => Ok(ClusterLabel::Mature),
            // USA, folded into MATURE instead of being alone in its cluster
            2 => Ok(ClusterLabel::Mature),
            // India, considered POTENTIAL because of the huge local scene
            3 => Ok(ClusterLabel::Potential),
            other => Err(ApplicationError::new(ErrorType::Validation, format!("Cluster id not known: {other}"))),
        }
    }
}

pub struct CountryDetailType {
    pub iso2: String,
    pub internet_users: f64,
    pub population: i64,
}

impl CountryDetailType {
    pub fn new(iso2: String, internet_users: f64, population: i64) -> Self {
        CountryDetailType { iso2, internet_users, population }
    }
}

pub struct UserDetailType {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub artist_profile: Option<ArtistDetailType>,
}

impl UserDetailType {
    pub fn new(id: i64, email: String, username: String, role: Role, artist_profile: Option<ArtistDetailType>) -> Self {
        UserDetailType { id, email, username, role, artist_profile }
    }
}

pub struct ArtistDetailType {
    pub id: i64,
    pub name: String,
    pub nationality: String,
    pub user_id: Option<i64>,
    pub manager_id: Option<i64>,
    pub manager_name: Option<String>,
}

impl ArtistDetailType {
    pub fn new(id: i64, name: String, nationality: String, user_id: Option<i64>, manager_id: Option<i64>, manager_name: Option<String>) -> Self {
        ArtistDetailType { id, name, nationality, user_id, manager_id, manager_name }
    }
}

pub struct ChartDetailType {
    pub id: i64,
    pub country: CountryDetailType,
    pub entries: Vec<ChartEntryDetailType>,
}

impl ChartDetailType {
    pub fn new(id: i64, country: CountryDetailType, entries: Vec<ChartEntryDetailType>) -> Self {
        ChartDetailType { id, country, entries }
    }
}

pub struct ChartEntryDetailType {
    pub id: i64,
    pub chart_id: i64,
    pub country_iso2: String,
    pub artist: ArtistDetailType,
    pub rank: i32,
}

impl ChartEntryDetailType {
    pub fn new(id: i64, chart_id: i64, country_iso2: String, artist: ArtistDetailType, rank: i32) -> Self {
        ChartEntryDetailType { id, chart_id, country_iso2, artist, rank }
    }
}

pub struct CountryClusterDetailType {
    pub country: CountryDetailType,
    pub cluster: ClusterLabel,
}

impl CountryClusterDetailType {
    pub fn new(country: CountryDetailType, cluster: ClusterLabel) -> Self {
        CountryClusterDetailType { country, cluster }
    }
}

/***************** Input types *********************/

/**
 * Input for creating a user.
 */
#[derive(Debug, Clone)]
pub struct UserAddInputType {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub artist_id: Option<i64>,
}

impl UserAddInputType {
    pub fn new(email: String, username: String, password: String, role: Role, artist_id: Option<i64>) -> Self {
        UserAddInputType { email, username, password, role, artist_id }
    }

    /**
     * Validates the field-level constraints. The artist_id existence and
     * linkage checks require the database and live in the service.
     */
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if self.email.trim().is_empty() || !self.email.contains('@') {
            return Err(ApplicationError::new(ErrorType::Validation, "A valid email is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(ApplicationError::new(ErrorType::Validation, "Username is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(ApplicationError::new(ErrorType::Validation, "Password is required".to_string()));
        }
        if self.role == Role::Artist && self.artist_id.is_none() {
            return Err(ApplicationError::new(ErrorType::Validation, "artist_id is required when role is 'artist'".to_string()));
        }
        Ok(self)
    }
}

/**
 * Partial update of a user. Absent fields are left untouched.
 */
#[derive(Debug, Clone)]
pub struct UserUpdateInputType {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl UserUpdateInputType {
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if let Some(email) = &self.email
            && (email.trim().is_empty() || !email.contains('@'))
        {
            return Err(ApplicationError::new(ErrorType::Validation, "A valid email is required".to_string()));
        }
        if let Some(username) = &self.username
            && username.trim().is_empty()
        {
            return Err(ApplicationError::new(ErrorType::Validation, "Username is required".to_string()));
        }
        if let Some(password) = &self.password
            && password.is_empty()
        {
            return Err(ApplicationError::new(ErrorType::Validation, "Password must not be empty".to_string()));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ArtistAddInputType {
    pub name: String,
    pub nationality: String,
    pub manager_id: Option<i64>,
}

impl ArtistAddInputType {
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if self.name.trim().is_empty() {
            return Err(ApplicationError::new(ErrorType::Validation, "Artist name is required".to_string()));
        }
        validate_iso2(&self.nationality)?;
        Ok(self)
    }
}

/**
 * Partial update of an artist.
 */
#[derive(Debug, Clone)]
pub struct ArtistUpdateInputType {
    pub name: Option<String>,
    pub nationality: Option<String>,
    pub manager_id: Option<i64>,
}

impl ArtistUpdateInputType {
    pub fn validate(self) -> Result<Self, ApplicationError> {
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(ApplicationError::new(ErrorType::Validation, "Artist name must not be empty".to_string()));
        }
        if let Some(nationality) = &self.nationality {
            validate_iso2(nationality)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct CountryAddInputType {
    pub iso2: String,
    pub internet_users: f64,
    pub population: i64,
}

impl CountryAddInputType {
    pub fn validate(self) -> Result<Self, ApplicationError> {
        validate_iso2(&self.iso2)?;
        if !(0.0..=100.0).contains(&self.internet_users) {
            return Err(ApplicationError::new(ErrorType::Validation, "Internet users must be a percentage".to_string()));
        }
        if self.population < 0 {
            return Err(ApplicationError::new(ErrorType::Validation, "Population must not be negative".to_string()));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ChartEntryAddInputType {
    pub chart_id: i64,
    pub artist_id: i64,
    pub rank: i32,
}

impl ChartEntryAddInputType {
    pub fn validate(self) -> Result<Self, ApplicationError> {
        validate_rank(self.rank)?;
        Ok(self)
    }
}

/**
 * Upsert of the rank of an artist, identified by its login user,
 * within a chart.
 */
#[derive(Debug, Clone)]
pub struct ChartEntryUpsertInputType {
    pub chart_id: i64,
    pub artist_user_id: i64,
    pub rank: i32,
}

impl ChartEntryUpsertInputType {
    pub fn validate(self) -> Result<Self, ApplicationError> {
        validate_rank(self.rank)?;
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ClusterAddInputType {
    pub country_iso2: String,
    pub cluster: ClusterLabel,
}

impl ClusterAddInputType {
    pub fn validate(self) -> Result<Self, ApplicationError> {
        validate_iso2(&self.country_iso2)?;
        Ok(self)
    }
}

fn validate_iso2(iso2: &str) -> Result<(), ApplicationError> {
    if iso2.len() != 2 || !iso2.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ApplicationError::new(ErrorType::Validation, format!("Invalid iso2 country code: {iso2}")));
    }
    Ok(())
}

fn validate_rank(rank: i32) -> Result<(), ApplicationError> {
    if rank < 1 {
        return Err(ApplicationError::new(ErrorType::Validation, "Rank must be 1 or greater".to_string()));
    }
    Ok(())
}

/***************** Analysis output types *********************/

/**
 * Result of the country development analysis.
 */
pub struct CountryDevelopmentOutputType {
    pub country: CountryDetailType,
    pub cluster: ClusterLabel,
    pub artist_count: i64,
    pub chart_count: i64,
}

/**
 * Result of the export potential analysis.
 */
pub struct ExportPotentialOutputType {
    pub artist: ArtistDetailType,
    pub foreign_chart_entries: i64,
    pub countries: Vec<CountryPotentialType>,
}

/**
 * Artists of the analyzed artist's nationality charting in one
 * destination country, best rank each.
 */
pub struct CountryPotentialType {
    pub country: String,
    pub artists: Vec<ArtistRankType>,
}

pub struct ArtistRankType {
    pub name: String,
    pub rank: i32,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin").unwrap(), Role::Admin);
        assert_eq!(Role::parse("manager").unwrap(), Role::Manager);
        assert_eq!(Role::parse("artist").unwrap(), Role::Artist);
        assert!(Role::parse("superuser").is_err());
    }

    #[test]
    fn test_cluster_label_parse() {
        assert_eq!(ClusterLabel::parse("MATURE").unwrap(), ClusterLabel::Mature);
        assert_eq!(ClusterLabel::parse("POTENTIAL").unwrap(), ClusterLabel::Potential);
        assert!(ClusterLabel::parse("mature").is_err());
    }

    #[test]
    fn test_cluster_dataset_id_mapping() {
        assert_eq!(ClusterLabel::from_dataset_id(0).unwrap(), ClusterLabel::Potential);
        assert_eq!(ClusterLabel::from_dataset_id(1).unwrap(), ClusterLabel::Mature);
        assert_eq!(ClusterLabel::from_dataset_id(2).unwrap(), ClusterLabel::Mature);
        assert_eq!(ClusterLabel::from_dataset_id(3).unwrap(), ClusterLabel::Potential);
        assert!(ClusterLabel::from_dataset_id(4).is_err());
        assert!(ClusterLabel::from_dataset_id(-1).is_err());
    }

    #[test]
    fn test_user_add_requires_artist_id_for_artist_role() {
        let input = UserAddInputType::new("a@b.c".to_string(), "a".to_string(), "pw".to_string(), Role::Artist, None);
        assert!(input.validate().is_err());
        let input = UserAddInputType::new("a@b.c".to_string(), "a".to_string(), "pw".to_string(), Role::Artist, Some(1));
        assert!(input.validate().is_ok());
        let input = UserAddInputType::new("a@b.c".to_string(), "a".to_string(), "pw".to_string(), Role::Manager, None);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_user_add_rejects_invalid_email() {
        let input = UserAddInputType::new("not-an-email".to_string(), "a".to_string(), "pw".to_string(), Role::Manager, None);
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_country_add_validation() {
        let input = CountryAddInputType { iso2: "FR".to_string(), internet_users: 85.3, population: 67000000 };
        assert!(input.validate().is_ok());
        let input = CountryAddInputType { iso2: "FRA".to_string(), internet_users: 85.3, population: 67000000 };
        assert!(input.validate().is_err());
        let input = CountryAddInputType { iso2: "FR".to_string(), internet_users: 130.0, population: 67000000 };
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_chart_entry_rank_validation() {
        assert!(ChartEntryAddInputType { chart_id: 1, artist_id: 1, rank: 1 }.validate().is_ok());
        assert!(ChartEntryAddInputType { chart_id: 1, artist_id: 1, rank: 0 }.validate().is_err());
        assert!(ChartEntryUpsertInputType { chart_id: 1, artist_user_id: 1, rank: -3 }.validate().is_err());
    }
}
