use std::{collections::HashMap, fs::File, io::Read, path::Path};

use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::{
    dao::{artists::ArtistDao, charts::ChartDao, clusters::ClusterDao, countries::CountryDao},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ArtistAddInputType, ChartEntryAddInputType, ClusterAddInputType, ClusterLabel, CountryAddInputType},
    },
};

const COUNTRIES_FILE: &str = "countries.csv";
const ARTISTS_FILE: &str = "artists.csv";
const CHARTS_FILE: &str = "charts.csv";
const CLUSTERS_FILE: &str = "clusters.csv";

/**
 * A row of countries.csv.
 */
#[derive(Debug, Deserialize)]
struct CountryRecord {
    country_iso2: String,
    #[serde(rename = "%_internet")]
    internet_users: f64,
    population_total: i64,
}

/**
 * A row of artists.csv.
 */
#[derive(Debug, Deserialize)]
struct ArtistRecord {
    #[serde(rename = "artistName")]
    name: String,
    #[serde(rename = "artistCountry")]
    nationality: String,
}

/**
 * A row of charts.csv.
 */
#[derive(Debug, Deserialize)]
struct ChartRecord {
    country_iso2: String,
    #[serde(rename = "artistName")]
    artist_name: String,
    #[serde(rename = "artistCountry")]
    artist_nationality: String,
    #[serde(rename = "currentRank")]
    rank: i32,
}

/**
 * A row of clusters.csv.
 */
#[derive(Debug, Deserialize)]
struct ClusterRecord {
    country_iso2: String,
    cluster: i64,
}

/**
 * Represents the service loading the CSV datasets into the database.
 * All files are parsed before the database is touched, and the load
 * itself runs in a single transaction.
 */
pub struct DatasetLoaderService {
    country_dao: CountryDao,
    artist_dao: ArtistDao,
    chart_dao: ChartDao,
    cluster_dao: ClusterDao,
    connection_pool: Pool<Postgres>,
}

impl DatasetLoaderService {
    /**
     * Creates a new instance of `DatasetLoaderService`.
     */
    pub fn new(country_dao: CountryDao, artist_dao: ArtistDao, chart_dao: ChartDao, cluster_dao: ClusterDao, connection_pool: Pool<Postgres>) -> Self {
        DatasetLoaderService { country_dao, artist_dao, chart_dao, cluster_dao, connection_pool }
    }

    /**
     * Loads the four datasets from the given directory, replacing any
     * previously loaded data.
     *
     * # Arguments
     * `datasets_dir`: Directory holding countries.csv, artists.csv,
     * charts.csv and clusters.csv.
     */
    pub async fn load(&self, datasets_dir: &Path) -> Result<(), ApplicationError> {
        let countries: Vec<CountryRecord> = parse_dataset(datasets_dir, COUNTRIES_FILE)?;
        let artists: Vec<ArtistRecord> = parse_dataset(datasets_dir, ARTISTS_FILE)?;
        let chart_entries: Vec<ChartRecord> = parse_dataset(datasets_dir, CHARTS_FILE)?;
        let clusters: Vec<ClusterRecord> = parse_dataset(datasets_dir, CLUSTERS_FILE)?;
        tracing::info!("Parsed {} countries, {} artists, {} chart entries, {} clusters", countries.len(), artists.len(), chart_entries.len(), clusters.len());

        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        let result = self.load_in_transaction(&mut transaction, countries, artists, chart_entries, clusters).await;
        match result {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        tracing::info!("Datasets loaded");
        Ok(())
    }

    async fn load_in_transaction(
        &self,
        transaction: &mut sqlx::Transaction<'_, Postgres>,
        countries: Vec<CountryRecord>,
        artists: Vec<ArtistRecord>,
        chart_entries: Vec<ChartRecord>,
        clusters: Vec<ClusterRecord>,
    ) -> Result<(), ApplicationError> {
        // Wipe in dependency order, then rebuild.
        self.cluster_dao.delete_all_clusters(transaction).await?;
        self.chart_dao.delete_all_charts(transaction).await?;
        self.artist_dao.delete_all_artists(transaction).await?;
        self.country_dao.delete_all_countries(transaction).await?;

        // One chart per country, entries or not.
        let mut chart_ids: HashMap<String, i64> = HashMap::new();
        for record in countries {
            let input = CountryAddInputType { iso2: record.country_iso2, internet_users: record.internet_users, population: record.population_total }.validate()?;
            self.country_dao.add_country(transaction, &input).await?;
            let chart_id = self.chart_dao.add_chart(transaction, &input.iso2).await?;
            chart_ids.insert(input.iso2, chart_id);
        }
        for record in artists {
            let input = ArtistAddInputType { name: record.name, nationality: record.nationality, manager_id: None }.validate()?;
            self.artist_dao.add_artist(transaction, &input).await?;
        }
        self.load_entries(transaction, &chart_ids, chart_entries).await?;
        for record in clusters {
            let cluster = ClusterLabel::from_dataset_id(record.cluster)?;
            let input = ClusterAddInputType { country_iso2: record.country_iso2, cluster }.validate()?;
            self.cluster_dao.add_cluster(transaction, &input).await?;
        }
        Ok(())
    }

    /**
     * Attaches chart entries to the per-country charts, resolving each
     * artist by (name, nationality). Zero or multiple matches abort the
     * load, as does an entry for a country absent from countries.csv.
     */
    async fn load_entries(&self, transaction: &mut sqlx::Transaction<'_, Postgres>, chart_ids: &HashMap<String, i64>, chart_entries: Vec<ChartRecord>) -> Result<(), ApplicationError> {
        for record in chart_entries {
            let chart_id = *chart_ids
                .get(&record.country_iso2)
                .ok_or_else(|| ApplicationError::new(ErrorType::Validation, format!("Unknown country {} for chart entry ({}, {})", record.country_iso2, record.artist_name, record.artist_nationality)))?;
            let matches = self.artist_dao.find_artists_by_name_and_nationality(transaction, &record.artist_name, &record.artist_nationality).await?;
            let artist = match matches.as_slice() {
                [artist] => artist,
                [] => return Err(ApplicationError::new(ErrorType::Validation, format!("No artist found for chart entry ({}, {})", record.artist_name, record.artist_nationality))),
                _ => return Err(ApplicationError::new(ErrorType::Validation, format!("Multiple artists match chart entry ({}, {})", record.artist_name, record.artist_nationality))),
            };
            let input = ChartEntryAddInputType { chart_id, artist_id: artist.id, rank: record.rank }.validate()?;
            self.chart_dao.add_entry(transaction, &input).await?;
        }
        Ok(())
    }
}

/**
 * Opens and parses one CSV dataset. Any read or parse failure is fatal.
 */
fn parse_dataset<T: for<'de> Deserialize<'de>>(datasets_dir: &Path, file_name: &str) -> Result<Vec<T>, ApplicationError> {
    let path = datasets_dir.join(file_name);
    let file = File::open(&path).map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Couldn't load dataset {file_name}: {err}")))?;
    parse_records(file, file_name)
}

fn parse_records<T: for<'de> Deserialize<'de>, R: Read>(reader: R, file_name: &str) -> Result<Vec<T>, ApplicationError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader
        .deserialize()
        .map(|record| record.map_err(|err| ApplicationError::new(ErrorType::Validation, format!("Couldn't load dataset {file_name}: {err}"))))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_country_records() {
        let data = "country_iso2,%_internet,population_total\nFR,85.3,67000000\nDE,89.7,83000000\n";
        let records: Vec<CountryRecord> = parse_records(data.as_bytes(), COUNTRIES_FILE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].country_iso2, "FR");
        assert_eq!(records[0].internet_users, 85.3);
        assert_eq!(records[1].population_total, 83000000);
    }

    #[test]
    fn test_parse_artist_records() {
        let data = "artistName,artistCountry\nStromae,BE\n";
        let records: Vec<ArtistRecord> = parse_records(data.as_bytes(), ARTISTS_FILE).unwrap();
        assert_eq!(records[0].name, "Stromae");
        assert_eq!(records[0].nationality, "BE");
    }

    #[test]
    fn test_parse_chart_records() {
        let data = "country_iso2,artistName,artistCountry,currentRank\nFR,Stromae,BE,3\n";
        let records: Vec<ChartRecord> = parse_records(data.as_bytes(), CHARTS_FILE).unwrap();
        assert_eq!(records[0].country_iso2, "FR");
        assert_eq!(records[0].artist_name, "Stromae");
        assert_eq!(records[0].rank, 3);
    }

    #[test]
    fn test_parse_cluster_records() {
        let data = "country_iso2,cluster\nFR,1\nIN,3\n";
        let records: Vec<ClusterRecord> = parse_records(data.as_bytes(), CLUSTERS_FILE).unwrap();
        assert_eq!(records[0].cluster, 1);
        assert_eq!(records[1].country_iso2, "IN");
    }

    #[test]
    fn test_parse_rejects_malformed_row() {
        let data = "country_iso2,%_internet,population_total\nFR,not-a-number,67000000\n";
        let result: Result<Vec<CountryRecord>, ApplicationError> = parse_records(data.as_bytes(), COUNTRIES_FILE);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_missing_column() {
        let data = "country_iso2,population_total\nFR,67000000\n";
        let result: Result<Vec<CountryRecord>, ApplicationError> = parse_records(data.as_bytes(), COUNTRIES_FILE);
        assert!(result.is_err());
    }
}

#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_load_creates_chart_for_country_without_entries() {
        let pool = init_db().await;
        let service = DatasetLoaderService::new(CountryDao::new(), ArtistDao::new(), ChartDao::new(), ClusterDao::new(), pool.clone());
        let mut transaction = pool.begin().await.unwrap();
        let countries = vec![
            CountryRecord { country_iso2: "ZX".to_string(), internet_users: 80.0, population_total: 5_000_000 },
            CountryRecord { country_iso2: "ZY".to_string(), internet_users: 60.0, population_total: 9_000_000 },
        ];
        let artists = vec![ArtistRecord { name: "Loader Artist".to_string(), nationality: "ZX".to_string() }];
        let chart_entries = vec![ChartRecord { country_iso2: "ZX".to_string(), artist_name: "Loader Artist".to_string(), artist_nationality: "ZX".to_string(), rank: 1 }];
        service.load_in_transaction(&mut transaction, countries, artists, chart_entries, vec![]).await.unwrap();
        // ZY has no chart entries but still gets its chart
        let chart = service.chart_dao.get_chart_by_country(&mut transaction, "ZY").await.unwrap();
        let chart = chart.unwrap();
        assert_eq!(chart.country.iso2, "ZY");
        let entries = service.chart_dao.list_entries_by_chart(&mut transaction, chart.id).await.unwrap();
        assert!(entries.is_empty());
        transaction.rollback().await.unwrap(); // Rollback the transaction to avoid leaving test data in the database
    }

    #[sqlx::test]
    async fn test_load_rejects_entry_for_unknown_country() {
        let pool = init_db().await;
        let service = DatasetLoaderService::new(CountryDao::new(), ArtistDao::new(), ChartDao::new(), ClusterDao::new(), pool.clone());
        let mut transaction = pool.begin().await.unwrap();
        let countries = vec![CountryRecord { country_iso2: "ZX".to_string(), internet_users: 80.0, population_total: 5_000_000 }];
        let artists = vec![ArtistRecord { name: "Loader Artist".to_string(), nationality: "ZX".to_string() }];
        let chart_entries = vec![ChartRecord { country_iso2: "ZQ".to_string(), artist_name: "Loader Artist".to_string(), artist_nationality: "ZX".to_string(), rank: 1 }];
        let result = service.load_in_transaction(&mut transaction, countries, artists, chart_entries, vec![]).await;
        assert!(result.is_err_and(|err| err.error_type == ErrorType::Validation));
        transaction.rollback().await.unwrap(); // Rollback the transaction to avoid leaving test data in the database
    }

    /**
     * Initialize the database connection pool.
     */
    async fn init_db() -> PgPool {
        dotenv::from_filename("./.env-test").ok();
        let pool = PgPool::connect(dotenv::var("DATABASE_URL").unwrap().as_str()).await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }
}
