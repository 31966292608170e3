use std::collections::HashMap;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    dao::{artists::ArtistDao, countries::CountryDao, tokens::TokenDao, users::UserDao},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ArtistAddInputType, Role, UserAddInputType, UserDetailType, UserUpdateInputType},
    },
};

/**
 * Represents the service for managing users, credentials and the refresh
 * token denylist.
 */
pub struct UserService {
    user_dao: UserDao,
    artist_dao: ArtistDao,
    country_dao: CountryDao,
    token_dao: TokenDao,
    connection_pool: Pool<Postgres>,
}

impl UserService {
    /**
     * Creates a new instance of `UserService`.
     *
     * # Arguments
     * `user_dao`: The DAO for user operations.
     * `artist_dao`: The DAO for artist operations.
     * `country_dao`: The DAO for country operations.
     * `token_dao`: The DAO for the token denylist.
     * `connection_pool`: Connection pool for database operations.
     */
    pub fn new(user_dao: UserDao, artist_dao: ArtistDao, country_dao: CountryDao, token_dao: TokenDao, connection_pool: Pool<Postgres>) -> Self {
        UserService { user_dao, artist_dao, country_dao, token_dao, connection_pool }
    }

    /**
     * Creates a user. When the role is artist the referenced artist profile
     * must exist and must not be linked to another user; it is linked to
     * the new user in the same transaction.
     *
     * # Arguments
     * `user_add_input`: The validated user input.
     *
     * # Returns
     * A Result containing the created user or an `ApplicationError`.
     */
    pub async fn create_user(&self, user_add_input: UserAddInputType) -> Result<UserDetailType, ApplicationError> {
        let password_hash = hash_password(&user_add_input.password)?;
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        let result = self.create_user_in_transaction(&mut transaction, &user_add_input, &password_hash).await;
        match result {
            Ok(user) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                Ok(user)
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                Err(err)
            }
        }
    }

    async fn create_user_in_transaction(&self, transaction: &mut sqlx::Transaction<'_, Postgres>, user_add_input: &UserAddInputType, password_hash: &str) -> Result<UserDetailType, ApplicationError> {
        let artist = match (user_add_input.role, user_add_input.artist_id) {
            (Role::Artist, Some(artist_id)) => {
                let artist = self
                    .artist_dao
                    .get_artist(transaction, artist_id)
                    .await?
                    .ok_or_else(|| ApplicationError::new(ErrorType::Validation, "This artist does not exist".to_string()))?;
                if artist.user_id.is_some() {
                    return Err(ApplicationError::new(ErrorType::Validation, "This artist profile is already associated with another user".to_string()));
                }
                Some(artist)
            }
            _ => None,
        };
        let user_id = self.user_dao.add_user(transaction, user_add_input, password_hash).await?;
        let artist_profile = match artist {
            Some(mut artist) => {
                self.artist_dao.link_user(transaction, artist.id, user_id).await?;
                artist.user_id = Some(user_id);
                Some(artist)
            }
            None => None,
        };
        Ok(UserDetailType::new(user_id, user_add_input.email.clone(), user_add_input.username.clone(), user_add_input.role, artist_profile))
    }

    /**
     * Retrieves all users with their artist profiles.
     */
    pub async fn get_user_list(&self) -> Result<Vec<UserDetailType>, ApplicationError> {
        let mut connection = self.acquire().await?;
        let users = self.user_dao.list_users(&mut connection).await?;
        let artists = self.artist_dao.list_artists(&mut connection).await?;
        let mut profiles: HashMap<i64, _> = artists.into_iter().filter_map(|artist| artist.user_id.map(|user_id| (user_id, artist))).collect();
        Ok(users.into_iter().map(|user| {
            let profile = profiles.remove(&user.id);
            UserDetailType::new(user.id, user.email, user.username, user.role, profile)
        }).collect())
    }

    /**
     * Retrieves a user by id with its artist profile.
     */
    pub async fn get_user(&self, user_id: i64) -> Result<UserDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        let user = self.user_dao.get_user(&mut connection, user_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "User not found".to_string()))?;
        let profile = self.artist_dao.get_artist_by_user(&mut connection, user.id).await?;
        Ok(UserDetailType::new(user.id, user.email, user.username, user.role, profile))
    }

    /**
     * Applies a partial update to a user.
     */
    pub async fn update_user(&self, user_id: i64, user_update_input: UserUpdateInputType) -> Result<UserDetailType, ApplicationError> {
        let password_hash = user_update_input.password.as_deref().map(hash_password).transpose()?;
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        match self.user_dao.update_user(&mut transaction, user_id, &user_update_input, password_hash).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        self.get_user(user_id).await
    }

    /**
     * Deletes a user by id.
     */
    pub async fn delete_user(&self, user_id: i64) -> Result<(), ApplicationError> {
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        match self.user_dao.delete_user(&mut transaction, user_id).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        Ok(())
    }

    /**
     * Assigns a role to a user. When the new role is artist and the user
     * has no artist profile yet, an empty profile is created with the
     * first country as default nationality.
     *
     * # Arguments
     * `user_id`: The user to change.
     * `role`: The new role.
     *
     * # Returns
     * A Result containing the updated user or an `ApplicationError`.
     */
    pub async fn assign_role(&self, user_id: i64, role: Role) -> Result<UserDetailType, ApplicationError> {
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        let result = self.assign_role_in_transaction(&mut transaction, user_id, role).await;
        match result {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        self.get_user(user_id).await
    }

    async fn assign_role_in_transaction(&self, transaction: &mut sqlx::Transaction<'_, Postgres>, user_id: i64, role: Role) -> Result<(), ApplicationError> {
        let user = self.user_dao.get_user(transaction, user_id).await?.ok_or_else(|| ApplicationError::new(ErrorType::Validation, "User not found".to_string()))?;
        self.user_dao.update_role(transaction, user_id, role).await?;
        if role == Role::Artist && self.artist_dao.get_artist_by_user(transaction, user_id).await?.is_none() {
            let default_country = self
                .country_dao
                .get_first_country(transaction)
                .await?
                .ok_or_else(|| ApplicationError::new(ErrorType::Validation, "No country available for a default nationality".to_string()))?;
            let artist_id = self
                .artist_dao
                .add_artist(transaction, &ArtistAddInputType { name: user.username, nationality: default_country.iso2, manager_id: None })
                .await?;
            self.artist_dao.link_user(transaction, artist_id, user_id).await?;
        }
        Ok(())
    }

    /**
     * Verifies login credentials and returns the user.
     *
     * # Arguments
     * `email`: The login identifier.
     * `password`: The plain text password.
     *
     * # Returns
     * A Result containing the user or an `ApplicationError` with
     * "Invalid credentials" for unknown emails and wrong passwords alike.
     */
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<UserDetailType, ApplicationError> {
        let mut connection = self.acquire().await?;
        let Some(user) = self.user_dao.get_user_by_email(&mut connection, email).await? else {
            return Err(ApplicationError::new(ErrorType::Validation, "Invalid credentials".to_string()));
        };
        if !verify_password(password, &user.password_hash)? {
            return Err(ApplicationError::new(ErrorType::Validation, "Invalid credentials".to_string()));
        }
        let profile = self.artist_dao.get_artist_by_user(&mut connection, user.id).await?;
        Ok(UserDetailType::new(user.id, user.email, user.username, user.role, profile))
    }

    /**
     * Blacklists a refresh token by its jti claim.
     */
    pub async fn blacklist_refresh_token(&self, jti: Uuid) -> Result<(), ApplicationError> {
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        match self.token_dao.blacklist(&mut transaction, jti).await {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        Ok(())
    }

    /**
     * Checks whether a refresh token jti has been blacklisted.
     */
    pub async fn is_refresh_token_blacklisted(&self, jti: Uuid) -> Result<bool, ApplicationError> {
        let mut connection = self.acquire().await?;
        self.token_dao.is_blacklisted(&mut connection, jti).await
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, ApplicationError> {
        self.connection_pool.acquire().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))
    }
}

/**
 * Hashes a password with Argon2id and a random salt, returning the
 * PHC-formatted hash string.
 */
pub fn hash_password(password: &str) -> Result<String, ApplicationError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2.hash_password(password.as_bytes(), &salt).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Failed to hash password: {err}")))?;
    Ok(password_hash.to_string())
}

/**
 * Verifies a password against a stored PHC-formatted hash.
 */
pub fn verify_password(password: &str, hash: &str) -> Result<bool, ApplicationError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Invalid password hash format: {err}")))?;
    let argon2 = Argon2::default();
    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(ApplicationError::new(ErrorType::Application, format!("Failed to verify password: {err}"))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hash_password_produces_phc_hash() {
        let hash = hash_password("password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_verify_password_correct_and_incorrect() {
        let hash = hash_password("password").unwrap();
        assert!(verify_password("password", &hash).unwrap());
        assert!(!verify_password("not-the-password", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash_format() {
        assert!(verify_password("password", "not-a-phc-hash").is_err());
    }

    #[test]
    fn test_hash_password_salts_differ() {
        let hash1 = hash_password("password").unwrap();
        let hash2 = hash_password("password").unwrap();
        assert_ne!(hash1, hash2);
    }
}
