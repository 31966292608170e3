use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    dao::handle_database_error,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ClusterAddInputType, ClusterLabel, CountryClusterDetailType, CountryDetailType},
    },
};

/**
 * Database response type for querying clusters joined with their country.
 */
pub type QueryClusterDbResp = (String, f64, i64, String);

fn to_cluster_detail(row: QueryClusterDbResp) -> Result<CountryClusterDetailType, ApplicationError> {
    let (iso2, internet_users, population, cluster) = row;
    let cluster = ClusterLabel::parse(&cluster).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Stored cluster label is invalid: {err}")))?;
    Ok(CountryClusterDetailType::new(CountryDetailType::new(iso2, internet_users, population), cluster))
}

const QUERY_CLUSTER_LIST: &str = "SELECT co.iso2, co.internet_users, co.population, cl.cluster
                                  FROM country_cluster cl JOIN country co ON cl.country_iso2 = co.iso2 ORDER BY co.iso2";

const QUERY_CLUSTER_BY_COUNTRY: &str = "SELECT co.iso2, co.internet_users, co.population, cl.cluster
                                        FROM country_cluster cl JOIN country co ON cl.country_iso2 = co.iso2 WHERE cl.country_iso2 = $1";

const ADD_CLUSTER: &str = "INSERT INTO country_cluster (country_iso2, cluster) VALUES ($1, $2)";

const DELETE_CLUSTER: &str = "DELETE FROM country_cluster WHERE country_iso2 = $1";

const DELETE_ALL_CLUSTERS: &str = "DELETE FROM country_cluster";

/**
 * DAO for country cluster database operations.
 */
pub struct ClusterDao {}

impl ClusterDao {
    pub fn new() -> Self {
        ClusterDao {}
    }

    /**
     * Retrieves all country clusters with their countries.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_clusters(&self, connection: &mut PgConnection) -> Result<Vec<CountryClusterDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryClusterDbResp> = sqlx::query_as(QUERY_CLUSTER_LIST)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list clusters: {err}")))?;
        results.into_iter().map(to_cluster_detail).collect()
    }

    /**
     * Retrieves the cluster of a country.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_cluster_by_country(&self, connection: &mut PgConnection, iso2: &str) -> Result<Option<CountryClusterDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryClusterDbResp> = sqlx::query_as(QUERY_CLUSTER_BY_COUNTRY)
            .bind(iso2)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get cluster: {err}")))?;
        result.map(to_cluster_detail).transpose()
    }

    /**
     * Inserts a cluster label for a country.
     */
    #[instrument(skip(self, transaction, cluster_add_input), fields(result))]
    pub async fn add_cluster(&self, transaction: &mut PgConnection, cluster_add_input: &ClusterAddInputType) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(ADD_CLUSTER)
            .bind(&cluster_add_input.country_iso2)
            .bind(cluster_add_input.cluster.as_str())
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(())
    }

    /**
     * Deletes the cluster label of a country.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_cluster(&self, transaction: &mut PgConnection, iso2: &str) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_CLUSTER)
            .bind(iso2)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete cluster: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Cluster for country {} not found for deletion", iso2);
            return Err(ApplicationError::new(ErrorType::NotFound, "Cluster not found".to_string()));
        }
        Ok(())
    }

    /**
     * Deletes all clusters. Used by the dataset loader.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_all_clusters(&self, transaction: &mut PgConnection) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(DELETE_ALL_CLUSTERS)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete clusters: {err}")))?;
        Ok(())
    }
}
