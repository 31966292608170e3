use rand::{Rng, seq::SliceRandom};
use sqlx::{Pool, Postgres};

use crate::{
    dao::{artists::ArtistDao, users::UserDao},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{ArtistDetailType, Role, UserAddInputType},
    },
    service::users::hash_password,
};

const MAX_ARTISTS_PER_MANAGER: usize = 10;

/**
 * Represents the service seeding login accounts: one admin, a number of
 * managers and an artist login per randomly assigned artist.
 */
pub struct SeedService {
    user_dao: UserDao,
    artist_dao: ArtistDao,
    connection_pool: Pool<Postgres>,
}

impl SeedService {
    /**
     * Creates a new instance of `SeedService`.
     */
    pub fn new(user_dao: UserDao, artist_dao: ArtistDao, connection_pool: Pool<Postgres>) -> Self {
        SeedService { user_dao, artist_dao, connection_pool }
    }

    /**
     * Wipes all users and creates the admin, the managers and the artist
     * logins in one transaction. Every account gets the same password.
     *
     * # Arguments
     * `managers`: Number of manager accounts to create.
     * `password`: Shared plain text password.
     */
    pub async fn seed(&self, managers: u32, password: &str) -> Result<(), ApplicationError> {
        let password_hash = hash_password(password)?;
        let mut transaction = self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))?;
        let result = self.seed_in_transaction(&mut transaction, managers, &password_hash).await;
        match result {
            Ok(()) => transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?,
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn seed_in_transaction(&self, transaction: &mut sqlx::Transaction<'_, Postgres>, managers: u32, password_hash: &str) -> Result<(), ApplicationError> {
        self.user_dao.delete_all_users(transaction).await?;
        self.user_dao.add_user(transaction, &user_input("admin@gmail.com", "admin", Role::Admin), password_hash).await?;
        tracing::info!("Created admin account");

        // Deleting the users detached every artist, so all are up for grabs.
        let mut artists = self.artist_dao.list_unmanaged_artists(transaction).await?;
        let assignment_counts = plan_assignments(&mut artists, managers);

        let mut artists = artists.into_iter();
        for (manager_index, count) in assignment_counts.into_iter().enumerate() {
            let manager_number = manager_index + 1;
            let manager_email = format!("manager{manager_number}@gmail.com");
            let manager_username = format!("manager{manager_number}");
            let manager_id = self.user_dao.add_user(transaction, &user_input(&manager_email, &manager_username, Role::Manager), password_hash).await?;
            for (artist_number, artist) in artists.by_ref().take(count).enumerate() {
                let artist_email = format!("artist.{manager_number}.{}@gmail.com", artist_number + 1);
                let artist_username = format!("artist.{manager_number}.{}", artist_number + 1);
                let user_id = self.user_dao.add_user(transaction, &user_input(&artist_email, &artist_username, Role::Artist), password_hash).await?;
                self.artist_dao.assign_manager_and_user(transaction, artist.id, manager_id, user_id).await?;
            }
            tracing::info!("Created manager {} with {} artists", manager_username, count);
        }
        Ok(())
    }
}

fn user_input(email: &str, username: &str, role: Role) -> UserAddInputType {
    UserAddInputType::new(email.to_string(), username.to_string(), String::new(), role, None)
}

/**
 * Shuffles the artist pool and draws a random assignment count per
 * manager. Kept out of the async path so the rng is never held across
 * an await.
 */
fn plan_assignments(artists: &mut [ArtistDetailType], managers: u32) -> Vec<usize> {
    let mut rng = rand::thread_rng();
    artists.shuffle(&mut rng);
    (0..managers).map(|_| rng.gen_range(0..=MAX_ARTISTS_PER_MANAGER)).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn artist(id: i64) -> ArtistDetailType {
        ArtistDetailType::new(id, format!("Artist {id}"), "FR".to_string(), None, None, None)
    }

    #[test]
    fn test_plan_assignments_count_per_manager() {
        let mut artists: Vec<ArtistDetailType> = (1..=20).map(artist).collect();
        let counts = plan_assignments(&mut artists, 5);
        assert_eq!(counts.len(), 5);
        assert!(counts.iter().all(|count| *count <= MAX_ARTISTS_PER_MANAGER));
    }

    #[test]
    fn test_plan_assignments_no_managers() {
        let mut artists: Vec<ArtistDetailType> = (1..=3).map(artist).collect();
        let counts = plan_assignments(&mut artists, 0);
        assert!(counts.is_empty());
        assert_eq!(artists.len(), 3);
    }
}
