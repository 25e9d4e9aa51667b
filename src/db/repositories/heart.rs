//! Heart repository
//!
//! A heart is a (user, store) pair. The primary key makes the pair unique,
//! so toggling is a delete followed by an insert only when nothing was
//! deleted.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, SqlitePool};
use std::sync::Arc;

/// Heart repository trait
#[async_trait]
pub trait HeartRepository: Send + Sync {
    /// Remove the heart if present, add it otherwise.
    ///
    /// Returns the user's hearted store ids after the toggle.
    async fn toggle(&self, user_id: i64, store_id: i64) -> Result<Vec<i64>>;

    /// Hearted store ids, oldest heart first
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based heart repository implementation
pub struct SqlxHeartRepository {
    pool: DynDatabasePool,
}

impl SqlxHeartRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn HeartRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl HeartRepository for SqlxHeartRepository {
    async fn toggle(&self, user_id: i64, store_id: i64) -> Result<Vec<i64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => toggle_heart_sqlite(self.pool.sqlite()?, user_id, store_id).await,
            DatabaseDriver::Mysql => toggle_heart_mysql(self.pool.mysql()?, user_id, store_id).await,
        }
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<i64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_hearts_sqlite(self.pool.sqlite()?, user_id).await,
            DatabaseDriver::Mysql => list_hearts_mysql(self.pool.mysql()?, user_id).await,
        }
    }
}

const LIST_HEARTS_SQL: &str =
    "SELECT store_id FROM hearts WHERE user_id = ? ORDER BY created_at ASC, store_id ASC";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn toggle_heart_sqlite(pool: &SqlitePool, user_id: i64, store_id: i64) -> Result<Vec<i64>> {
    let removed = sqlx::query("DELETE FROM hearts WHERE user_id = ? AND store_id = ?")
        .bind(user_id)
        .bind(store_id)
        .execute(pool)
        .await
        .context("Failed to remove heart")?
        .rows_affected();

    if removed == 0 {
        // a concurrent toggle may have inserted the pair already
        sqlx::query("INSERT OR IGNORE INTO hearts (user_id, store_id, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(store_id)
            .bind(Utc::now())
            .execute(pool)
            .await
            .context("Failed to add heart")?;
    }

    list_hearts_sqlite(pool, user_id).await
}

async fn list_hearts_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>(LIST_HEARTS_SQL)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list hearts")
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn toggle_heart_mysql(pool: &MySqlPool, user_id: i64, store_id: i64) -> Result<Vec<i64>> {
    let removed = sqlx::query("DELETE FROM hearts WHERE user_id = ? AND store_id = ?")
        .bind(user_id)
        .bind(store_id)
        .execute(pool)
        .await
        .context("Failed to remove heart")?
        .rows_affected();

    if removed == 0 {
        sqlx::query("INSERT IGNORE INTO hearts (user_id, store_id, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(store_id)
            .bind(Utc::now())
            .execute(pool)
            .await
            .context("Failed to add heart")?;
    }

    list_hearts_mysql(pool, user_id).await
}

async fn list_hearts_mysql(pool: &MySqlPool, user_id: i64) -> Result<Vec<i64>> {
    sqlx::query_scalar::<_, i64>(LIST_HEARTS_SQL)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to list hearts")
}
