//! User repository
//!
//! Database operations for user accounts, including the pending
//! password-reset token stored on the user row.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, name, email, password_hash, reset_token, reset_expires, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update name and email
    async fn update_profile(&self, id: i64, name: &str, email: &str) -> Result<Option<User>>;

    /// Store a reset token and its expiry on the user
    async fn set_reset_token(&self, id: i64, token: &str, expires: DateTime<Utc>) -> Result<()>;

    /// Find the user holding `token` whose expiry is after `now`
    async fn get_by_valid_reset_token(&self, token: &str, now: DateTime<Utc>)
        -> Result<Option<User>>;

    /// Set a new password hash and clear the reset token in one statement.
    ///
    /// Matches only while the token is still stored and unexpired, so a
    /// token can be consumed once. Returns whether a row was updated.
    async fn consume_reset_token(
        &self,
        id: i64,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by ID")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(email)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by email")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(email)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by email")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn update_profile(&self, id: i64, name: &str, email: &str) -> Result<Option<User>> {
        let now = Utc::now();
        let sql = "UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(name)
                    .bind(email)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update user")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(name)
                    .bind(email)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update user")?;
            }
        }
        self.get_by_id(id).await
    }

    async fn set_reset_token(&self, id: i64, token: &str, expires: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE users SET reset_token = ?, reset_expires = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(token)
                    .bind(expires)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to set reset token")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(token)
                    .bind(expires)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to set reset token")?;
            }
        }
        Ok(())
    }

    async fn get_by_valid_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE reset_token = ? AND reset_expires > ?",
            USER_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(token)
                    .bind(now)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user by reset token")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(token)
                    .bind(now)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user by reset token")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn consume_reset_token(
        &self,
        id: i64,
        token: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = r#"
            UPDATE users
            SET password_hash = ?, reset_token = NULL, reset_expires = NULL, updated_at = ?
            WHERE id = ? AND reset_token = ? AND reset_expires > ?
        "#;
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(password_hash)
                .bind(now)
                .bind(id)
                .bind(token)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to reset password")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(password_hash)
                .bind(now)
                .bind(id)
                .bind(token)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to reset password")?
                .rows_affected(),
        };
        Ok(affected == 1)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        reset_token: row.try_get("reset_token")?,
        reset_expires: row.try_get("reset_expires")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        reset_token: row.try_get("reset_token")?,
        reset_expires: row.try_get("reset_expires")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;
    use chrono::Duration;

    async fn setup_test_repo() -> SqlxUserRepository {
        SqlxUserRepository::new(migrated_pool().await)
    }

    fn new_user(name: &str, email: &str) -> User {
        User::new(name.to_string(), email.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn test_create_and_lookup_user() {
        let repo = setup_test_repo().await;
        let created = repo
            .create(&new_user("Wes", "wes@example.com"))
            .await
            .expect("Failed to create user");
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().expect("by id");
        assert_eq!(by_id.email, "wes@example.com");

        let by_email = repo
            .get_by_email("wes@example.com")
            .await
            .unwrap()
            .expect("by email");
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.password_hash, "hash");

        assert!(repo.get_by_id(9999).await.unwrap().is_none());
        assert!(repo.get_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_email_constraint() {
        let repo = setup_test_repo().await;
        repo.create(&new_user("Wes", "wes@example.com")).await.unwrap();

        let err = repo
            .create(&new_user("Other", "wes@example.com"))
            .await
            .unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("Wes", "wes@example.com")).await.unwrap();

        let updated = repo
            .update_profile(user.id, "Wesley", "wesley@example.com")
            .await
            .unwrap()
            .expect("user");
        assert_eq!(updated.name, "Wesley");
        assert_eq!(updated.email, "wesley@example.com");
        assert_eq!(updated.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_reset_token_lifecycle() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("Wes", "wes@example.com")).await.unwrap();
        let now = Utc::now();

        repo.set_reset_token(user.id, "tok", now + Duration::hours(1))
            .await
            .unwrap();

        let found = repo
            .get_by_valid_reset_token("tok", now)
            .await
            .unwrap()
            .expect("valid token");
        assert_eq!(found.id, user.id);
        assert!(repo
            .get_by_valid_reset_token("tok", now + Duration::hours(2))
            .await
            .unwrap()
            .is_none());

        assert!(repo.consume_reset_token(user.id, "tok", "new-hash", now).await.unwrap());
        // second use of the same token matches nothing
        assert!(!repo.consume_reset_token(user.id, "tok", "other", now).await.unwrap());

        let after = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(after.password_hash, "new-hash");
        assert!(after.reset_token.is_none());
        assert!(after.reset_expires.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_cannot_be_consumed() {
        let repo = setup_test_repo().await;
        let user = repo.create(&new_user("Wes", "wes@example.com")).await.unwrap();
        let now = Utc::now();

        repo.set_reset_token(user.id, "old", now - Duration::minutes(1))
            .await
            .unwrap();
        assert!(!repo.consume_reset_token(user.id, "old", "new-hash", now).await.unwrap());

        let after = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(after.password_hash, "hash");
    }
}
