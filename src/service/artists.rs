use sqlx::{Pool, Postgres};

use crate::{
    dao::{artists::ArtistDao, charts::ChartDao, users::UserDao},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ArtistAddInputType, ArtistDetailType, ArtistUpdateInputType, ChartEntryDetailType, Role},
    },
};

/**
 * Represents the service for managing artists.
 */
pub struct ArtistService {
    artist_dao: ArtistDao,
    chart_dao: ChartDao,
    user_dao: UserDao,
    connection_pool: Pool<Postgres>,
}

impl ArtistService {
    /**
     * Creates a new instance of `ArtistService`.
     */
    pub fn new(artist_dao: ArtistDao, chart_dao: ChartDao, user_dao: UserDao, connection_pool: Pool<Postgres>) -> Self {
        ArtistService { artist_dao, chart_dao, user_dao, connection_pool }
    }

    /**
     * Retrieves all artists.
     */
    pub async fn get_artist_list(&self) -> Result<Vec<ArtistDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.artist_dao.list_artists(&mut connection).await
    }

    /**
     * Retrieves the artists managed by the given manager.
     */
    pub async fn get_artist_list_for_manager(&self, manager_id: i64) -> Result<Vec<ArtistDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.artist_dao.list_artists_by_manager(&mut connection, manager_id).await
    }

    /**
     * Retrieves a single artist.
     */
    pub async fn get_artist(&self, artist_id: i64) -> Result<ArtistDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.artist_dao.get_artist(&mut connection, artist_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Artist not found".to_string()))
    }

    /**
     * Retrieves the artist profile linked to a login user.
     */
    pub async fn get_artist_for_user(&self, user_id: i64) -> Result<ArtistDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.artist_dao.get_artist_by_user(&mut connection, user_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "No artist profile found".to_string()))
    }

    /**
     * Retrieves the distinct nationalities across all artists.
     */
    pub async fn get_nationalities(&self) -> Result<Vec<String>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.artist_dao.list_nationalities(&mut connection).await
    }

    /**
     * Retrieves the chart entries of an artist.
     */
    pub async fn get_performance(&self, artist_id: i64) -> Result<Vec<ChartEntryDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.artist_dao.get_artist(&mut connection, artist_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "Artist not found".to_string()))?;
        self.chart_dao.list_entries_by_artist(&mut connection, artist_id).await
    }

    /**
     * Creates an artist. The manager, when given, must exist and have the
     * manager role.
     */
    pub async fn create_artist(&self, artist_add_input: ArtistAddInputType) -> Result<ArtistDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = async {
            if let Some(manager_id) = artist_add_input.manager_id {
                self.require_manager(&mut transaction, manager_id).await?;
            }
            self.artist_dao.add_artist(&mut transaction, &artist_add_input).await
        }
        .await;
        let artist_id = match result {
            Ok(artist_id) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                artist_id
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        };
        self.get_artist(artist_id).await
    }

    /**
     * Applies a partial update to an artist.
     */
    pub async fn update_artist(&self, artist_id: i64, artist_update_input: ArtistUpdateInputType) -> Result<ArtistDetailType, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = async {
            if let Some(manager_id) = artist_update_input.manager_id {
                self.require_manager(&mut transaction, manager_id).await?;
            }
            self.artist_dao.update_artist(&mut transaction, artist_id, &artist_update_input).await
        }
        .await;
        match result {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        self.get_artist(artist_id).await
    }

    /**
     * Deletes an artist by id.
     */
    pub async fn delete_artist(&self, artist_id: i64) -> Result<(), ApplicationError> {
        let mut transaction = self.begin().await?;
        match self.artist_dao.delete_artist(&mut transaction, artist_id).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn require_manager(&self, transaction: &mut sqlx::Transaction<'_, Postgres>, manager_id: i64) -> Result<(), ApplicationError> {
        let manager = self.user_dao.get_user(transaction, manager_id).await?;
        match manager {
            Some(user) if user.role == Role::Manager => Ok(()),
            _ => Err(ApplicationError::new(ErrorType::Validation, "Manager not found".to_string())),
        }
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, ApplicationError> {
        self.connection_pool.acquire().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, Postgres>, ApplicationError> {
        self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))
    }
}
