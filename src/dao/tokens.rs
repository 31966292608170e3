use sqlx::PgConnection;
use tracing::{Instrument, instrument};
use uuid::Uuid;

use crate::{
    dao::handle_database_error,
    model::apperror::{ApplicationError, ErrorType},
};

const BLACKLIST_TOKEN: &str = "INSERT INTO token_blacklist (jti, blacklisted_at) VALUES ($1, now()) ON CONFLICT (jti) DO NOTHING";

const QUERY_BLACKLISTED: &str = "SELECT EXISTS(SELECT 1 FROM token_blacklist WHERE jti = $1)";

/**
 * DAO for the refresh token denylist.
 */
pub struct TokenDao {}

impl TokenDao {
    pub fn new() -> Self {
        TokenDao {}
    }

    /**
     * Blacklists a refresh token by its jti claim. Blacklisting the same
     * token twice is a no-op.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn blacklist(&self, transaction: &mut PgConnection, jti: Uuid) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(BLACKLIST_TOKEN)
            .bind(jti)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(())
    }

    /**
     * Checks whether a refresh token jti has been blacklisted.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn is_blacklisted(&self, connection: &mut PgConnection, jti: Uuid) -> Result<bool, ApplicationError> {
        let span = tracing::Span::current();
        let row: (bool,) = sqlx::query_as(QUERY_BLACKLISTED)
            .bind(jti)
            .fetch_one(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to check token blacklist: {err}")))?;
        Ok(row.0)
    }
}
