use std::collections::HashMap;

use sqlx::{Pool, Postgres};

use crate::{
    dao::{artists::ArtistDao, charts::ChartDao, countries::CountryDao, users::UserDao},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ChartDetailType, ChartEntryAddInputType, ChartEntryDetailType, ChartEntryUpsertInputType, Role},
    },
};

/**
 * Represents the service for managing charts and chart entries.
 */
pub struct ChartService {
    chart_dao: ChartDao,
    country_dao: CountryDao,
    artist_dao: ArtistDao,
    user_dao: UserDao,
    connection_pool: Pool<Postgres>,
}

impl ChartService {
    /**
     * Creates a new instance of `ChartService`.
     */
    pub fn new(chart_dao: ChartDao, country_dao: CountryDao, artist_dao: ArtistDao, user_dao: UserDao, connection_pool: Pool<Postgres>) -> Self {
        ChartService { chart_dao, country_dao, artist_dao, user_dao, connection_pool }
    }

    /**
     * Retrieves all charts with their nested country and entries.
     */
    pub async fn get_chart_list(&self) -> Result<Vec<ChartDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        let charts = self.chart_dao.list_charts(&mut connection).await?;
        let entries = self.chart_dao.list_entries(&mut connection).await?;
        let mut grouped: HashMap<i64, Vec<ChartEntryDetailType>> = HashMap::new();
        for entry in entries {
            grouped.entry(entry.chart_id).or_default().push(entry);
        }
        Ok(charts.into_iter().map(|chart| ChartDetailType::new(chart.id, chart.country, grouped.remove(&chart.id).unwrap_or_default())).collect())
    }

    /**
     * Retrieves a single chart with its entries.
     */
    pub async fn get_chart(&self, chart_id: i64) -> Result<ChartDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        let chart = self.chart_dao.get_chart(&mut connection, chart_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Chart not found".to_string()))?;
        let entries = self.chart_dao.list_entries_by_chart(&mut connection, chart.id).await?;
        Ok(ChartDetailType::new(chart.id, chart.country, entries))
    }

    /**
     * Retrieves the charts of a country. The country must exist; the
     * result holds at most one chart.
     */
    pub async fn get_charts_by_country(&self, iso2: &str) -> Result<Vec<ChartDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.country_dao.get_country(&mut connection, iso2).await?.ok_or_else(|| ApplicationError::new(ErrorType::Validation, "Country not found".to_string()))?;
        let Some(chart) = self.chart_dao.get_chart_by_country(&mut connection, iso2).await? else {
            return Ok(vec![]);
        };
        let entries = self.chart_dao.list_entries_by_chart(&mut connection, chart.id).await?;
        Ok(vec![ChartDetailType::new(chart.id, chart.country, entries)])
    }

    /**
     * Retrieves the distinct countries that have a chart.
     */
    pub async fn get_chart_countries(&self) -> Result<Vec<String>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.chart_dao.list_chart_countries(&mut connection).await
    }

    /**
     * Creates a chart for a country.
     */
    pub async fn create_chart(&self, country_iso2: &str) -> Result<ChartDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = async {
            self.country_dao
                .get_country(&mut transaction, country_iso2)
                .await?
                .ok_or_else(|| ApplicationError::new(ErrorType::Validation, "Country not found".to_string()))?;
            self.chart_dao.add_chart(&mut transaction, country_iso2).await
        }
        .await;
        let chart_id = match result {
            Ok(chart_id) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                chart_id
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        };
        self.get_chart(chart_id).await
    }

    /**
     * Deletes a chart by id.
     */
    pub async fn delete_chart(&self, chart_id: i64) -> Result<(), ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.chart_dao.delete_chart(&mut transaction, chart_id).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        Ok(())
    }

    /**
     * Retrieves all chart entries.
     */
    pub async fn get_entry_list(&self) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.chart_dao.list_entries(&mut connection).await
    }

    /**
     * Retrieves a single chart entry.
     */
    pub async fn get_entry(&self, entry_id: i64) -> Result<ChartEntryDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.chart_dao.get_entry(&mut connection, entry_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Chart entry not found".to_string()))
    }

    /**
     * Retrieves the chart entries of every artist managed by a manager.
     * The manager must exist and have the manager role.
     */
    pub async fn get_entries_for_manager(&self, manager_id: i64) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        match self.user_dao.get_user(&mut connection, manager_id).await? {
            Some(user) if user.role == Role::Manager => {}
            _ => return Err(ApplicationError::new(ErrorType::Validation, "Manager not found".to_string())),
        }
        self.chart_dao.list_entries_by_manager(&mut connection, manager_id).await
    }

    /**
     * Retrieves the chart entries of the artist linked to a login user.
     */
    pub async fn get_entries_for_artist_user(&self, user_id: i64) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        let artist = self.artist_dao.get_artist_by_user(&mut connection, user_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::Validation, "Artist not found".to_string()))?;
        self.chart_dao.list_entries_by_artist(&mut connection, artist.id).await
    }

    /**
     * Creates a chart entry.
     */
    pub async fn create_entry(&self, entry_add_input: ChartEntryAddInputType) -> Result<ChartEntryDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = async {
            let chart = self.chart_dao.get_chart(&mut transaction, entry_add_input.chart_id).await?;
            let artist = self.artist_dao.get_artist(&mut transaction, entry_add_input.artist_id).await?;
            if chart.is_none() || artist.is_none() {
                return Err(ApplicationError::new(ErrorType::Validation, "Invalid chart or artist".to_string()));
            }
            self.chart_dao.add_entry(&mut transaction, &entry_add_input).await
        }
        .await;
        let entry_id = match result {
            Ok(entry_id) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                entry_id
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        };
        self.get_entry(entry_id).await
    }

    /**
     * Inserts or updates the rank of an artist, identified by its login
     * user, within a chart.
     */
    pub async fn upsert_entry(&self, upsert_input: ChartEntryUpsertInputType) -> Result<ChartEntryDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = async {
            let chart = self.chart_dao.get_chart(&mut transaction, upsert_input.chart_id).await?;
            let artist = self.artist_dao.get_artist_by_user(&mut transaction, upsert_input.artist_user_id).await?;
            let (Some(chart), Some(artist)) = (chart, artist) else {
                return Err(ApplicationError::new(ErrorType::Validation, "Invalid chart or artist".to_string()));
            };
            self.chart_dao.upsert_entry(&mut transaction, chart.id, artist.id, upsert_input.rank).await
        }
        .await;
        let entry_id = match result {
            Ok(entry_id) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                entry_id
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        };
        self.get_entry(entry_id).await
    }

    /**
     * Deletes a chart entry by id.
     */
    pub async fn delete_entry(&self, entry_id: i64) -> Result<(), ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.chart_dao.delete_entry(&mut transaction, entry_id).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, ApplicationError> {
        self.connection_pool.acquire().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, Postgres>, ApplicationError> {
        self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))
    }
}
