use sqlx::{Pool, Postgres};

use crate::{
    dao::{clusters::ClusterDao, countries::CountryDao},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ClusterAddInputType, CountryAddInputType, CountryClusterDetailType, CountryDetailType},
    },
};

/**
 * Represents the service for managing countries and their cluster labels.
 */
pub struct CountryService {
    country_dao: CountryDao,
    cluster_dao: ClusterDao,
    connection_pool: Pool<Postgres>,
}

impl CountryService {
    /**
     * Creates a new instance of `CountryService`.
     */
    pub fn new(country_dao: CountryDao, cluster_dao: ClusterDao, connection_pool: Pool<Postgres>) -> Self {
        CountryService { country_dao, cluster_dao, connection_pool }
    }

    /**
     * Retrieves all countries.
     */
    pub async fn get_country_list(&self) -> Result<Vec<CountryDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.country_dao.list_countries(&mut connection).await
    }

    /**
     * Retrieves a single country.
     */
    pub async fn get_country(&self, iso2: &str) -> Result<CountryDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.country_dao.get_country(&mut connection, iso2).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Country not found".to_string()))
    }

    /**
     * Creates a country.
     */
    pub async fn create_country(&self, country_add_input: CountryAddInputType) -> Result<CountryDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.country_dao.add_country(&mut transaction, &country_add_input).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        self.get_country(&country_add_input.iso2).await
    }

    /**
     * Replaces the statistics of a country.
     */
    pub async fn update_country(&self, country_input: CountryAddInputType) -> Result<CountryDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.country_dao.update_country(&mut transaction, &country_input.iso2, country_input.internet_users, country_input.population).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        self.get_country(&country_input.iso2).await
    }

    /**
     * Deletes a country. Its chart and cluster rows cascade.
     */
    pub async fn delete_country(&self, iso2: &str) -> Result<(), ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.country_dao.delete_country(&mut transaction, iso2).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        Ok(())
    }

    /**
     * Retrieves all country clusters.
     */
    pub async fn get_cluster_list(&self) -> Result<Vec<CountryClusterDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.cluster_dao.list_clusters(&mut connection).await
    }

    /**
     * Retrieves the cluster of a country.
     */
    pub async fn get_cluster(&self, iso2: &str) -> Result<CountryClusterDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.cluster_dao.get_cluster_by_country(&mut connection, iso2).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Cluster not found".to_string()))
    }

    /**
     * Assigns a cluster label to a country.
     */
    pub async fn create_cluster(&self, cluster_add_input: ClusterAddInputType) -> Result<CountryClusterDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = async {
            self.country_dao
                .get_country(&mut transaction, &cluster_add_input.country_iso2)
                .await?
                .ok_or_else(|| ApplicationError::new(ErrorType::Validation, "Country not found".to_string()))?;
            self.cluster_dao.add_cluster(&mut transaction, &cluster_add_input).await
        }
        .await;
        match result {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        self.get_cluster(&cluster_add_input.country_iso2).await
    }

    /**
     * Deletes the cluster label of a country.
     */
    pub async fn delete_cluster(&self, iso2: &str) -> Result<(), ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.cluster_dao.delete_cluster(&mut transaction, iso2).await {
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
