use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    dao::handle_database_error,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{Role, UserAddInputType, UserUpdateInputType},
    },
};

/**
 * Database response type for querying users.
 */
pub type QueryUserDbResp = (i64, String, String, String, String);

/**
 * A user row including the stored password hash. The hash never leaves
 * the service layer.
 */
pub struct UserRowType {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

impl UserRowType {
    fn from_row(row: QueryUserDbResp) -> Result<Self, ApplicationError> {
        let (id, email, username, password_hash, role) = row;
        let role = Role::parse(&role).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Stored role is invalid: {err}")))?;
        Ok(UserRowType { id, email, username, password_hash, role })
    }
}

const QUERY_USER_LIST: &str = "SELECT id, email, username, password_hash, role FROM users ORDER BY id";

const QUERY_USER: &str = "SELECT id, email, username, password_hash, role FROM users WHERE id = $1";

const QUERY_USER_BY_EMAIL: &str = "SELECT id, email, username, password_hash, role FROM users WHERE email = $1";

const ADD_USER: &str = "INSERT INTO users (email, username, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING id";

const UPDATE_USER: &str = "UPDATE users SET email = COALESCE($1, email), username = COALESCE($2, username), password_hash = COALESCE($3, password_hash) WHERE id = $4";

const UPDATE_USER_ROLE: &str = "UPDATE users SET role = $1 WHERE id = $2";

const DELETE_USER: &str = "DELETE FROM users WHERE id = $1";

const DELETE_ALL_USERS: &str = "DELETE FROM users";

/**
 * DAO for user-related database operations.
 */
pub struct UserDao {}

impl UserDao {
    pub fn new() -> Self {
        UserDao {}
    }

    /**
     * Retrieves all users ordered by id.
     *
     * # Arguments
     * `connection`: The database connection.
     *
     * # Returns
     * A Result containing the user rows or an `ApplicationError`.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn list_users(&self, connection: &mut PgConnection) -> Result<Vec<UserRowType>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryUserDbResp> = sqlx::query_as(QUERY_USER_LIST)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to list users: {err}")))?;
        results.into_iter().map(UserRowType::from_row).collect()
    }

    /**
     * Retrieves a single user by id.
     *
     * # Arguments
     * `connection`: The database connection.
     * `user_id`: The id of the user.
     *
     * # Returns
     * A Result containing the user row if it exists, or an `ApplicationError`.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_user(&self, connection: &mut PgConnection, user_id: i64) -> Result<Option<UserRowType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryUserDbResp> = sqlx::query_as(QUERY_USER)
            .bind(user_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get user: {err}")))?;
        result.map(UserRowType::from_row).transpose()
    }

    /**
     * Retrieves a single user by email, the login identifier.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_user_by_email(&self, connection: &mut PgConnection, email: &str) -> Result<Option<UserRowType>, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryUserDbResp> = sqlx::query_as(QUERY_USER_BY_EMAIL)
            .bind(email)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get user by email: {err}")))?;
        result.map(UserRowType::from_row).transpose()
    }

    /**
     * Inserts a new user.
     *
     * # Arguments
     * `transaction`: The transaction to execute the query within.
     * `user_add_input`: The validated user input.
     * `password_hash`: The argon2 hash to store.
     *
     * # Returns
     * A Result containing the generated user id or an `ApplicationError`.
     */
    #[instrument(skip(self, transaction, user_add_input, password_hash), fields(result))]
    pub async fn add_user(&self, transaction: &mut PgConnection, user_add_input: &UserAddInputType, password_hash: &str) -> Result<i64, ApplicationError> {
        let span = tracing::Span::current();
        let row: (i64,) = sqlx::query_as(ADD_USER)
            .bind(&user_add_input.email)
            .bind(&user_add_input.username)
            .bind(password_hash)
            .bind(user_add_input.role.as_str())
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        Ok(row.0)
    }

    /**
     * Applies a partial update to a user. Absent fields keep their value.
     */
    #[instrument(skip(self, transaction, user_update_input, password_hash), fields(result))]
    pub async fn update_user(&self, transaction: &mut PgConnection, user_id: i64, user_update_input: &UserUpdateInputType, password_hash: Option<String>) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_USER)
            .bind(&user_update_input.email)
            .bind(&user_update_input.username)
            .bind(password_hash)
            .bind(user_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("User with id {} not found for update", user_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "User not found".to_string()));
        }
        Ok(())
    }

    /**
     * Updates the role of a user.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn update_role(&self, transaction: &mut PgConnection, user_id: i64, role: Role) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_USER_ROLE)
            .bind(role.as_str())
            .bind(user_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("User with id {} not found for role update", user_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "User not found".to_string()));
        }
        Ok(())
    }

    /**
     * Deletes a user by id.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_user(&self, transaction: &mut PgConnection, user_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_USER)
            .bind(user_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete user: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("User with id {} not found for deletion", user_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "User not found".to_string()));
        }
        Ok(())
    }

    /**
     * Deletes all users. Used by the seeding command.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_all_users(&self, transaction: &mut PgConnection) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        sqlx::query(DELETE_ALL_USERS)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete users: {err}")))?;
        Ok(())
    }
}

#[cfg(feature = "integration-test")]
#[cfg(test)]
mod integration_test {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    async fn test_list_users() {
        let pool = init_db().await;
        let user_dao = UserDao::new();
        let mut connection = pool.acquire().await.unwrap();
        let result = user_dao.list_users(&mut connection).await;
        assert!(result.is_ok());
    }

    #[sqlx::test]
    async fn test_add_get_update_then_delete_user() {
        let pool = init_db().await;
        let mut transaction = pool.begin().await.unwrap();
        let user_dao = UserDao::new();
        let user_add_input = UserAddInputType::new("dao-test@gmail.com".to_string(), "dao-test".to_string(), "password".to_string(), Role::Manager, None);
        let user_id = user_dao.add_user(&mut transaction, &user_add_input, "hash").await.unwrap();
        let user = user_dao.get_user(&mut transaction, user_id).await.unwrap();
        assert!(user.is_some_and(|user| user.role == Role::Manager));
        let user_update_input = UserUpdateInputType { email: None, username: Some("dao-test-renamed".to_string()), password: None };
        let update_result = user_dao.update_user(&mut transaction, user_id, &user_update_input, None).await;
        assert!(update_result.is_ok());
        let delete_result = user_dao.delete_user(&mut transaction, user_id).await;
        assert!(delete_result.is_ok());
        transaction.rollback().await.unwrap(); // Rollback the transaction to avoid leaving test data in the database
    }

    #[sqlx::test]
    async fn test_get_user_by_email_not_found() {
        let pool = init_db().await;
        let user_dao = UserDao::new();
        let mut connection = pool.acquire().await.unwrap();
        let result = user_dao.get_user_by_email(&mut connection, "nobody@gmail.com").await.unwrap();
        assert!(result.is_none());
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
