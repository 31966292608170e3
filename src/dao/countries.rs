use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    dao::handle_database_error,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{CountryAddInputType, CountryDetailType},
    },
};

/**
 * Database response type for querying countries.
 */
pub type QueryCountryDbResp = (String, f64, i64);

impl From<QueryCountryDbResp> for CountryDetailType {
    fn from(row: QueryCountryDbResp) -> Self {
        let (iso2, internet_users, population) = row;
        CountryDetailType::new(iso2, internet_users, population)
    }
}

const QUERY_COUNTRY_LIST: &str = "SELECT iso2, internet_users, population FROM country ORDER BY iso2";

const QUERY_COUNTRY: &str = "SELECT iso2, internet_users, population FROM country WHERE iso2 = $1";

const QUERY_FIRST_COUNTRY: &str = "SELECT iso2, internet_users, population FROM country ORDER BY iso2 LIMIT 1";

const ADD_COUNTRY: &str = "INSERT INTO country (iso2, internet_users, population) VALUES ($1, $2, $3)";

const UPDATE_COUNTRY: &str = "UPDATE country SET internet_users = $1, population = $2 WHERE iso2 = $3";

const DELETE_COUNTRY: &str = "DELETE FROM country WHERE iso2 = $1";

const DELETE_ALL_COUNTRIES: &str = "DELETE FROM country";

/**
 * DAO for country-related database operations.
 */
pub struct CountryDao {}

impl CountryDao {
    pub fn new() -> Self {
        CountryDao {}
    }

    /**
     * Retrieves all countries ordered by iso2.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_countries(&self, connection: &mut PgConnection) -> Result<Vec<CountryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryCountryDbResp> = sqlx::query_as(QUERY_COUNTRY_LIST)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list countries: {err}")))?;
        Ok(results.into_iter().map(CountryDetailType::from).collect())
    }

    /**
     * Retrieves a single country by iso2 code.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_country(&self, connection: &mut PgConnection, iso2: &str) -> Result<Option<CountryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryCountryDbResp> = sqlx::query_as(QUERY_COUNTRY)
            .bind(iso2)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get country: {err}")))?;
        Ok(result.map(CountryDetailType::from))
    }

    /**
     * Retrieves the first country by iso2 order. Used as the default
     * nationality when assign_role creates an empty artist profile.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_first_country(&self, connection: &mut PgConnection) -> Result<Option<CountryDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryCountryDbResp> = sqlx::query_as(QUERY_FIRST_COUNTRY)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get first country: {err}")))?;
        Ok(result.map(CountryDetailType::from))
    }

    /**
     * Inserts a new country.
     */
    #[instrument(skip(self, transaction, country_add_input), fields(result))]
    pub async fn add_country(&self, transaction: &mut PgConnection, country_add_input: &CountryAddInputType) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(ADD_COUNTRY)
            .bind(&country_add_input.iso2)
            .bind(country_add_input.internet_users)
            .bind(country_add_input.population)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(())
    }

    /**
     * Updates the statistics of a country.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn update_country(&self, transaction: &mut PgConnection, iso2: &str, internet_users: f64, population: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_COUNTRY)
            .bind(internet_users)
            .bind(population)
            .bind(iso2)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Country {} not found for update", iso2);
            return Err(ApplicationError::new(ErrorType::NotFound, "Country not found".to_string()));
        }
        Ok(())
    }

    /**
     * Deletes a country. Charts and cluster rows cascade.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_country(&self, transaction: &mut PgConnection, iso2: &str) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_COUNTRY)
            .bind(iso2)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete country: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Country {} not found for deletion", iso2);
            return Err(ApplicationError::new(ErrorType::NotFound, "Country not found".to_string()));
        }
        Ok(())
    }

    /**
     * Deletes all countries. Used by the dataset loader.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_all_countries(&self, transaction: &mut PgConnection) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(DELETE_ALL_COUNTRIES)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete countries: {err}")))?;
        Ok(())
    }
}
