use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    dao::handle_database_error,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ArtistAddInputType, ArtistDetailType, ArtistUpdateInputType},
    },
};

/**
 * Database response type for querying artists. The last column is the
 * denormalized manager username.
 */
pub type QueryArtistDbResp = (i64, String, String, Option<i64>, Option<i64>, Option<String>);

impl From<QueryArtistDbResp> for ArtistDetailType {
    fn from(row: QueryArtistDbResp) -> Self {
        let (id, name, nationality, user_id, manager_id, manager_name) = row;
        ArtistDetailType::new(id, name, nationality, user_id, manager_id, manager_name)
    }
}

const QUERY_ARTIST: &str = "SELECT a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                            FROM artist a LEFT JOIN users m ON a.manager_id = m.id WHERE a.id = $1";

const QUERY_ARTIST_BY_USER: &str = "SELECT a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                    FROM artist a LEFT JOIN users m ON a.manager_id = m.id WHERE a.user_id = $1";

const QUERY_ARTIST_BY_NAME_AND_NATIONALITY: &str = "SELECT a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                                    FROM artist a LEFT JOIN users m ON a.manager_id = m.id WHERE a.name = $1 AND a.nationality = $2";

const QUERY_ARTIST_LIST: &str = "SELECT a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                 FROM artist a LEFT JOIN users m ON a.manager_id = m.id ORDER BY a.id";

const QUERY_ARTIST_LIST_BY_MANAGER: &str = "SELECT a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                            FROM artist a LEFT JOIN users m ON a.manager_id = m.id WHERE a.manager_id = $1 ORDER BY a.id";

const QUERY_ARTIST_LIST_UNMANAGED: &str = "SELECT a.id, a.name, a.nationality, a.user_id, a.manager_id, m.username
                                           FROM artist a LEFT JOIN users m ON a.manager_id = m.id WHERE a.manager_id IS NULL ORDER BY a.id";

const QUERY_NATIONALITIES: &str = "SELECT DISTINCT nationality FROM artist ORDER BY nationality";

const ADD_ARTIST: &str = "INSERT INTO artist (name, nationality, manager_id) VALUES ($1, $2, $3) RETURNING id";

const UPDATE_ARTIST: &str = "UPDATE artist SET name = COALESCE($1, name), nationality = COALESCE($2, nationality), manager_id = COALESCE($3, manager_id) WHERE id = $4";

const LINK_ARTIST_USER: &str = "UPDATE artist SET user_id = $1 WHERE id = $2";

const ASSIGN_ARTIST: &str = "UPDATE artist SET manager_id = $1, user_id = $2 WHERE id = $3";

const DELETE_ARTIST: &str = "DELETE FROM artist WHERE id = $1";

const DELETE_ALL_ARTISTS: &str = "DELETE FROM artist";

/**
 * DAO for artist-related database operations.
 */
pub struct ArtistDao {}

impl ArtistDao {
    pub fn new() -> Self {
        ArtistDao {}
    }

    /**
     * Retrieves all artists with their manager names.
     *
     * # Arguments
     * `connection`: The database connection.
     *
     * # Returns
     * A Result containing the artists or an `ApplicationError`.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_artists(&self, connection: &mut PgConnection) -> Result<Vec<ArtistDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryArtistDbResp> = sqlx::query_as(QUERY_ARTIST_LIST)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list artists: {err}")))?;
        Ok(results.into_iter().map(ArtistDetailType::from).collect())
    }

    /**
     * Retrieves the artists managed by the given manager.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_artists_by_manager(&self, connection: &mut PgConnection, manager_id: i64) -> Result<Vec<ArtistDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryArtistDbResp> = sqlx::query_as(QUERY_ARTIST_LIST_BY_MANAGER)
            .bind(manager_id)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list artists by manager: {err}")))?;
        Ok(results.into_iter().map(ArtistDetailType::from).collect())
    }

    /**
     * Retrieves the artists without a manager. Used by the seeding command.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_unmanaged_artists(&self, connection: &mut PgConnection) -> Result<Vec<ArtistDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryArtistDbResp> = sqlx::query_as(QUERY_ARTIST_LIST_UNMANAGED)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list unmanaged artists: {err}")))?;
        Ok(results.into_iter().map(ArtistDetailType::from).collect())
    }

    /**
     * Retrieves a single artist by id.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_artist(&self, connection: &mut PgConnection, artist_id: i64) -> Result<Option<ArtistDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryArtistDbResp> = sqlx::query_as(QUERY_ARTIST)
            .bind(artist_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get artist: {err}")))?;
        Ok(result.map(ArtistDetailType::from))
    }

    /**
     * Retrieves the artist profile linked to the given login user.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_artist_by_user(&self, connection: &mut PgConnection, user_id: i64) -> Result<Option<ArtistDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryArtistDbResp> = sqlx::query_as(QUERY_ARTIST_BY_USER)
            .bind(user_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get artist by user: {err}")))?;
        Ok(result.map(ArtistDetailType::from))
    }

    /**
     * Retrieves every artist matching (name, nationality). The loader
     * requires exactly one match and treats anything else as fatal.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn find_artists_by_name_and_nationality(&self, connection: &mut PgConnection, name: &str, nationality: &str) -> Result<Vec<ArtistDetailType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryArtistDbResp> = sqlx::query_as(QUERY_ARTIST_BY_NAME_AND_NATIONALITY)
            .bind(name)
            .bind(nationality)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to find artist by name and nationality: {err}")))?;
        Ok(results.into_iter().map(ArtistDetailType::from).collect())
    }

    /**
     * Retrieves the distinct nationalities across all artists.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_nationalities(&self, connection: &mut PgConnection) -> Result<Vec<String>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<(String,)> = sqlx::query_as(QUERY_NATIONALITIES)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list nationalities: {err}")))?;
        Ok(results.into_iter().map(|row| row.0).collect())
    }

    /**
     * Inserts a new artist.
     *
     * # Returns
     * A Result containing the generated artist id or an `ApplicationError`.
     */
    #[instrument(skip(self, transaction, artist_add_input), fields(result))]
    pub async fn add_artist(&self, transaction: &mut PgConnection, artist_add_input: &ArtistAddInputType) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let row: (i64,) = sqlx::query_as(ADD_ARTIST)
            .bind(&artist_add_input.name)
            .bind(&artist_add_input.nationality)
            .bind(artist_add_input.manager_id)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(row.0)
    }

    /**
     * Applies a partial update to an artist. Absent fields keep their value.
     */
    #[instrument(skip(self, transaction, artist_update_input), fields(result))]
    pub async fn update_artist(&self, transaction: &mut PgConnection, artist_id: i64, artist_update_input: &ArtistUpdateInputType) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_ARTIST)
            .bind(&artist_update_input.name)
            .bind(&artist_update_input.nationality)
            .bind(artist_update_input.manager_id)
            .bind(artist_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Artist with id {} not found for update", artist_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "Artist not found".to_string()));
        }
        Ok(())
    }

    /**
     * Links a login user to an artist profile.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn link_user(&self, transaction: &mut PgConnection, artist_id: i64, user_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(LINK_ARTIST_USER)
            .bind(user_id)
            .bind(artist_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Artist with id {} not found for user link", artist_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "Artist not found".to_string()));
        }
        Ok(())
    }

    /**
     * Assigns a manager and a login user to an artist in one statement.
     * Used by the seeding command.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn assign_manager_and_user(&self, transaction: &mut PgConnection, artist_id: i64, manager_id: i64, user_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(ASSIGN_ARTIST)
            .bind(manager_id)
            .bind(user_id)
            .bind(artist_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(())
    }

    /**
     * Deletes an artist by id.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_artist(&self, transaction: &mut PgConnection, artist_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_ARTIST)
            .bind(artist_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete artist: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Artist with id {} not found for deletion", artist_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "Artist not found".to_string()));
        }
        Ok(())
    }

    /**
     * Deletes all artists. Used by the dataset loader.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_all_artists(&self, transaction: &mut PgConnection) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(DELETE_ALL_ARTISTS)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete artists: {err}")))?;
        Ok(())
    }
}
