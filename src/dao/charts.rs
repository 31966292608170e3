use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    dao::handle_database_error,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ArtistDetailType, ChartEntryAddInputType, ChartEntryDetailType, CountryDetailType},
    },
};

/**
 * Database response type for querying charts joined with their country.
 */
pub type QueryChartDbResp = (i64, String, f64, i64);

/**
 * A chart row before its entries are attached.
 */
pub struct ChartRowType {
    pub id: i64,
    pub country: CountryDetailType,
}

impl From<QueryChartDbResp> for ChartRowType {
    fn from(row: QueryChartDbResp) -> Self {
        let (id, iso2, internet_users, population) = row;
        ChartRowType { id, country: CountryDetailType::new(iso2, internet_users, population) }
    }
}

/**
 * Database response type for querying chart entries with the nested
 * artist and the denormalized chart country and manager name.
 */
pub type QueryChartEntryDbResp = (i64, i64, String, i32, i64, String, String, Option<i64>, Option<i64>, Option<String>);

impl From<QueryChartEntryDbResp> for ChartEntryDetailType {
    fn from(row: QueryChartEntryDbResp) -> Self {
        let (id, chart_id, country_iso2, rank, artist_id, name, nationality, user_id, manager_id, manager_name) = row;
        let artist = ArtistDetailType::new(artist_id, name, nationality, user_id, manager_id, manager_name);
        ChartEntryDetailType::new(id, chart_id, country_iso2, artist, rank)
    }
}

/**
 * Database response type for the export potential entry selection:
 * destination country, artist name, rank.
 */
pub type QueryForeignEntryDbResp = (String, String, i32);

const QUERY_CHART_LIST: &str = "SELECT c.id, co.iso2, co.internet_users, co.population
                                FROM chart c JOIN country co ON c.country_iso2 = co.iso2 ORDER BY c.id";

const QUERY_CHART: &str = "SELECT c.id, co.iso2, co.internet_users, co.population
                           FROM chart c JOIN country co ON c.country_iso2 = co.iso2 WHERE c.id = $1";

const QUERY_CHART_BY_COUNTRY: &str = "SELECT c.id, co.iso2, co.internet_users, co.population
                                      FROM chart c JOIN country co ON c.country_iso2 = co.iso2 WHERE c.country_iso2 = $1";

const QUERY_CHART_COUNTRIES: &str = "SELECT DISTINCT country_iso2 FROM chart ORDER BY country_iso2";

const COUNT_CHARTS_FOR_COUNTRY: &str = "SELECT COUNT(*) FROM chart WHERE country_iso2 = $1";

const COUNT_DISTINCT_ARTISTS_FOR_COUNTRY: &str = "SELECT COUNT(DISTINCT e.artist_id) FROM chart_entry e JOIN chart c ON e.chart_id = c.id WHERE c.country_iso2 = $1";

const ADD_CHART: &str = "INSERT INTO chart (country_iso2) VALUES ($1) RETURNING id";

const DELETE_CHART: &str = "DELETE FROM chart WHERE id = $1";

const DELETE_ALL_CHARTS: &str = "DELETE FROM chart";

const QUERY_ENTRY_LIST: &str = "SELECT e.id, e.chart_id, c.country_iso2, e.rank, a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                FROM chart_entry e JOIN chart c ON e.chart_id = c.id JOIN artist a ON e.artist_id = a.id LEFT JOIN users m ON a.manager_id = m.id
                                ORDER BY e.chart_id, e.rank";

const QUERY_ENTRY: &str = "SELECT e.id, e.chart_id, c.country_iso2, e.rank, a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                           FROM chart_entry e JOIN chart c ON e.chart_id = c.id JOIN artist a ON e.artist_id = a.id LEFT JOIN users m ON a.manager_id = m.id
                           WHERE e.id = $1";

const QUERY_ENTRIES_BY_CHART: &str = "SELECT e.id, e.chart_id, c.country_iso2, e.rank, a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                      FROM chart_entry e JOIN chart c ON e.chart_id = c.id JOIN artist a ON e.artist_id = a.id LEFT JOIN users m ON a.manager_id = m.id
                                      WHERE e.chart_id = $1 ORDER BY e.rank";

const QUERY_ENTRIES_BY_ARTIST: &str = "SELECT e.id, e.chart_id, c.country_iso2, e.rank, a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                       FROM chart_entry e JOIN chart c ON e.chart_id = c.id JOIN artist a ON e.artist_id = a.id LEFT JOIN users m ON a.manager_id = m.id
                                       WHERE e.artist_id = $1 ORDER BY c.country_iso2, e.rank";

const QUERY_ENTRIES_BY_MANAGER: &str = "SELECT e.id, e.chart_id, c.country_iso2, e.rank, a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                        FROM chart_entry e JOIN chart c ON e.chart_id = c.id JOIN artist a ON e.artist_id = a.id LEFT JOIN users m ON a.manager_id = m.id
                                        WHERE a.manager_id = $1 ORDER BY c.country_iso2, e.rank";

/**
 * Entries by same-nationality peers in charts of other countries, skipping
 * charts in which the analyzed artist itself appears.
 */
const QUERY_FOREIGN_ENTRIES: &str = "SELECT c.country_iso2, a.name, e.rank
                                     FROM chart_entry e JOIN chart c ON e.chart_id = c.id JOIN artist a ON e.artist_id = a.id
                                     WHERE a.nationality = $1 AND a.id <> $2 AND c.country_iso2 <> $1
                                     AND NOT EXISTS (SELECT 1 FROM chart_entry own WHERE own.chart_id = e.chart_id AND own.artist_id = $2)
                                     ORDER BY c.country_iso2, a.name, e.rank";

const ADD_ENTRY: &str = "INSERT INTO chart_entry (chart_id, artist_id, rank) VALUES ($1, $2, $3) RETURNING id";

const UPSERT_ENTRY: &str = "INSERT INTO chart_entry (chart_id, artist_id, rank) VALUES ($1, $2, $3)
                            ON CONFLICT (chart_id, artist_id) DO UPDATE SET rank = EXCLUDED.rank RETURNING id";

const DELETE_ENTRY: &str = "DELETE FROM chart_entry WHERE id = $1";

const DELETE_ALL_ENTRIES: &str = "DELETE FROM chart_entry";

/**
 * DAO for chart and chart entry database operations.
 */
pub struct ChartDao {}

impl ChartDao {
    pub fn new() -> Self {
        ChartDao {}
    }

    /**
     * Retrieves all charts joined with their countries, without entries.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_charts(&self, connection: &mut PgConnection) -> Result<Vec<ChartRowType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryChartDbResp> = sqlx::query_as(QUERY_CHART_LIST)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list charts: {err}")))?;
        Ok(results.into_iter().map(ChartRowType::from).collect())
    }

    /**
     * Retrieves a single chart by id.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_chart(&self, connection: &mut PgConnection, chart_id: i64) -> Result<Option<ChartRowType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryChartDbResp> = sqlx::query_as(QUERY_CHART)
            .bind(chart_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get chart: {err}")))?;
        Ok(result.map(ChartRowType::from))
    }

    /**
     * Retrieves the chart of a country. At most one exists.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_chart_by_country(&self, connection: &mut PgConnection, iso2: &str) -> Result<Option<ChartRowType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryChartDbResp> = sqlx::query_as(QUERY_CHART_BY_COUNTRY)
            .bind(iso2)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get chart by country: {err}")))?;
        Ok(result.map(ChartRowType::from))
    }

    /**
     * Retrieves the distinct countries that have a chart.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_chart_countries(&self, connection: &mut PgConnection) -> Result<Vec<String>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<(String,)> = sqlx::query_as(QUERY_CHART_COUNTRIES)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list chart countries: {err}")))?;
        Ok(results.into_iter().map(|row| row.0).collect())
    }

    /**
     * Counts the charts of a country.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn count_charts_for_country(&self, connection: &mut PgConnection, iso2: &str) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let row: (i64,) = sqlx::query_as(COUNT_CHARTS_FOR_COUNTRY)
            .bind(iso2)
            .fetch_one(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to count charts: {err}")))?;
        Ok(row.0)
    }

    /**
     * Counts the distinct artists appearing in a country's charts.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn count_distinct_artists_for_country(&self, connection: &mut PgConnection, iso2: &str) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let row: (i64,) = sqlx::query_as(COUNT_DISTINCT_ARTISTS_FOR_COUNTRY)
            .bind(iso2)
            .fetch_one(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to count artists: {err}")))?;
        Ok(row.0)
    }

    /**
     * Inserts a new chart for a country. The unique constraint on
     * country_iso2 enforces one chart per country.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_chart(&self, transaction: &mut PgConnection, country_iso2: &str) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let row: (i64,) = sqlx::query_as(ADD_CHART)
            .bind(country_iso2)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(row.0)
    }

    /**
     * Deletes a chart by id. Entries cascade.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_chart(&self, transaction: &mut PgConnection, chart_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_CHART)
            .bind(chart_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete chart: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Chart with id {} not found for deletion", chart_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "Chart not found".to_string()));
        }
        Ok(())
    }

    /**
     * Retrieves all chart entries.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_entries(&self, connection: &mut PgConnection) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryChartEntryDbResp> = sqlx::query_as(QUERY_ENTRY_LIST)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list chart entries: {err}")))?;
        Ok(results.into_iter().map(ChartEntryDetailType::from).collect())
    }

    /**
     * Retrieves a single chart entry by id.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_entry(&self, connection: &mut PgConnection, entry_id: i64) -> Result<Option<ChartEntryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryChartEntryDbResp> = sqlx::query_as(QUERY_ENTRY)
            .bind(entry_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get chart entry: {err}")))?;
        Ok(result.map(ChartEntryDetailType::from))
    }

    /**
     * Retrieves the entries of one chart ordered by rank.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_entries_by_chart(&self, connection: &mut PgConnection, chart_id: i64) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryChartEntryDbResp> = sqlx::query_as(QUERY_ENTRIES_BY_CHART)
            .bind(chart_id)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list entries by chart: {err}")))?;
        Ok(results.into_iter().map(ChartEntryDetailType::from).collect())
    }

    /**
     * Retrieves all chart entries of one artist.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_entries_by_artist(&self, connection: &mut PgConnection, artist_id: i64) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryChartEntryDbResp> = sqlx::query_as(QUERY_ENTRIES_BY_ARTIST)
            .bind(artist_id)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list entries by artist: {err}")))?;
        Ok(results.into_iter().map(ChartEntryDetailType::from).collect())
    }

    /**
     * Retrieves the chart entries of every artist managed by a manager.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_entries_by_manager(&self, connection: &mut PgConnection, manager_id: i64) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryChartEntryDbResp> = sqlx::query_as(QUERY_ENTRIES_BY_MANAGER)
            .bind(manager_id)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list entries by manager: {err}")))?;
        Ok(results.into_iter().map(ChartEntryDetailType::from).collect())
    }

    /**
     * Retrieves the export potential source rows for an artist: entries by
     * same-nationality peers in foreign charts the artist is absent from.
     *
     * # Arguments
     * `connection`: The database connection.
     * `nationality`: Nationality of the analyzed artist.
     * `artist_id`: The analyzed artist, excluded from the peer set.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_foreign_entries(&self, connection: &mut PgConnection, nationality: &str, artist_id: i64) -> Result<Vec<QueryForeignEntryDbResp>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryForeignEntryDbResp> = sqlx::query_as(QUERY_FOREIGN_ENTRIES)
            .bind(nationality)
            .bind(artist_id)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list foreign entries: {err}")))?;
        Ok(results)
    }

    /**
     * Inserts a new chart entry.
     */
    #[instrument(skip(self, transaction, entry_add_input), fields(result))]
    pub async fn add_entry(&self, transaction: &mut PgConnection, entry_add_input: &ChartEntryAddInputType) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let row: (i64,) = sqlx::query_as(ADD_ENTRY)
            .bind(entry_add_input.chart_id)
            .bind(entry_add_input.artist_id)
            .bind(entry_add_input.rank)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(row.0)
    }

    /**
     * Inserts or updates the rank of an artist within a chart.
     *
     * # Returns
     * A Result containing the entry id or an `ApplicationError`.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn upsert_entry(&self, transaction: &mut PgConnection, chart_id: i64, artist_id: i64, rank: i32) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let row: (i64,) = sqlx::query_as(UPSERT_ENTRY)
            .bind(chart_id)
            .bind(artist_id)
            .bind(rank)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(row.0)
    }

    /**
     * Deletes a chart entry by id.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_entry(&self, transaction: &mut PgConnection, entry_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_ENTRY)
            .bind(entry_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete chart entry: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Chart entry with id {} not found for deletion", entry_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "Chart entry not found".to_string()));
        }
        Ok(())
    }

    /**
     * Deletes all charts and entries. Used by the dataset loader.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_all_charts(&self, transaction: &mut PgConnection) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(DELETE_ALL_ENTRIES)
            .execute(&mut *transaction)
            .instrument(span.clone())
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete chart entries: {err}")))?;
        sqlx::query(DELETE_ALL_CHARTS)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete charts: {err}")))?;
        Ok(())
    }
}

#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use super::*;
    use crate::dao::artists::ArtistDao;
    use crate::dao::countries::CountryDao;
    use crate::model::models::{ArtistAddInputType, CountryAddInputType};
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_list_charts() {
        let pool = init_db().await;
        let chart_dao = ChartDao::new();
        let mut connection = pool.acquire().await.unwrap();
        let result = chart_dao.list_charts(&mut connection).await;
        assert!(result.is_ok());
    }

    #[sqlx::test]
    async fn test_chart_and_entry_lifecycle() {
        let pool = init_db().await;
        let mut transaction = pool.begin().await.unwrap();
        let chart_dao = ChartDao::new();
        let country_add_input = CountryAddInputType { iso2: "ZZ".to_string(), internet_users: 50.0, population: 1_000_000 };
        CountryDao::new().add_country(&mut transaction, &country_add_input).await.unwrap();
        let chart_id = chart_dao.add_chart(&mut transaction, "ZZ").await.unwrap();
        let artist_add_input = ArtistAddInputType { name: "Test Artist".to_string(), nationality: "ZZ".to_string(), manager_id: None };
        let artist_id = ArtistDao::new().add_artist(&mut transaction, &artist_add_input).await.unwrap();
        let entry_add_input = ChartEntryAddInputType { chart_id, artist_id, rank: 5 };
        let entry_id = chart_dao.add_entry(&mut transaction, &entry_add_input).await.unwrap();
        // Upserting the same (chart, artist) pair must update, not insert
        let upserted_id = chart_dao.upsert_entry(&mut transaction, chart_id, artist_id, 3).await.unwrap();
        assert_eq!(entry_id, upserted_id);
        let entries = chart_dao.list_entries_by_chart(&mut transaction, chart_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rank, 3);
        let delete_result = chart_dao.delete_chart(&mut transaction, chart_id).await;
        assert!(delete_result.is_ok());
        transaction.rollback().await.unwrap(); // Rollback the transaction to avoid leaving test data in the database
    }

    #[sqlx::test]
    async fn test_list_foreign_entries_excludes_home_and_own_charts() {
        let pool = init_db().await;
        let mut transaction = pool.begin().await.unwrap();
        let chart_dao = ChartDao::new();
        let country_dao = CountryDao::new();
        let artist_dao = ArtistDao::new();
        for iso2 in ["XA", "XB", "XC"] {
            let country_add_input = CountryAddInputType { iso2: iso2.to_string(), internet_users: 70.0, population: 2_000_000 };
            country_dao.add_country(&mut transaction, &country_add_input).await.unwrap();
        }
        let analyzed_id = artist_dao.add_artist(&mut transaction, &ArtistAddInputType { name: "Analyzed".to_string(), nationality: "XA".to_string(), manager_id: None }).await.unwrap();
        let peer_id = artist_dao.add_artist(&mut transaction, &ArtistAddInputType { name: "Peer".to_string(), nationality: "XA".to_string(), manager_id: None }).await.unwrap();
        let home_chart = chart_dao.add_chart(&mut transaction, "XA").await.unwrap();
        let shared_chart = chart_dao.add_chart(&mut transaction, "XB").await.unwrap();
        let clean_chart = chart_dao.add_chart(&mut transaction, "XC").await.unwrap();
        // Peer in the home chart: skipped, domestic
        chart_dao.add_entry(&mut transaction, &ChartEntryAddInputType { chart_id: home_chart, artist_id: peer_id, rank: 1 }).await.unwrap();
        // Peer in a foreign chart the analyzed artist also appears in: skipped
        chart_dao.add_entry(&mut transaction, &ChartEntryAddInputType { chart_id: shared_chart, artist_id: analyzed_id, rank: 2 }).await.unwrap();
        chart_dao.add_entry(&mut transaction, &ChartEntryAddInputType { chart_id: shared_chart, artist_id: peer_id, rank: 4 }).await.unwrap();
        // Peer in a foreign chart without the analyzed artist: the only hit
        chart_dao.add_entry(&mut transaction, &ChartEntryAddInputType { chart_id: clean_chart, artist_id: peer_id, rank: 7 }).await.unwrap();
        let rows = chart_dao.list_foreign_entries(&mut transaction, "XA", analyzed_id).await.unwrap();
        assert_eq!(rows, vec![("XC".to_string(), "Peer".to_string(), 7)]);
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
