//! Review repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Review, ReviewWithAuthor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Review repository trait
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Insert a review. `id` on the argument is ignored.
    async fn create(&self, review: &Review) -> Result<Review>;

    /// Reviews of a store with author names, newest first
    async fn list_for_store(&self, store_id: i64) -> Result<Vec<ReviewWithAuthor>>;
}

/// SQLx-based review repository implementation
pub struct SqlxReviewRepository {
    pool: DynDatabasePool,
}

impl SqlxReviewRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReviewRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ReviewRepository for SqlxReviewRepository {
    async fn create(&self, review: &Review) -> Result<Review> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_review_sqlite(self.pool.sqlite()?, review).await,
            DatabaseDriver::Mysql => create_review_mysql(self.pool.mysql()?, review).await,
        }
    }

    async fn list_for_store(&self, store_id: i64) -> Result<Vec<ReviewWithAuthor>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_reviews_sqlite(self.pool.sqlite()?, store_id).await,
            DatabaseDriver::Mysql => list_reviews_mysql(self.pool.mysql()?, store_id).await,
        }
    }
}

const LIST_REVIEWS_SQL: &str = r#"
    SELECT r.id, r.author_id, r.store_id, r.text, r.rating, r.created_at, u.name AS author_name
    FROM reviews r
    JOIN users u ON u.id = r.author_id
    WHERE r.store_id = ?
    ORDER BY r.created_at DESC, r.id DESC
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_review_sqlite(pool: &SqlitePool, review: &Review) -> Result<Review> {
    let result = sqlx::query(
        r#"
        INSERT INTO reviews (author_id, store_id, rating, text, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(review.author_id)
    .bind(review.store_id)
    .bind(review.rating)
    .bind(&review.text)
    .bind(review.created)
    .execute(pool)
    .await
    .context("Failed to create review")?;

    Ok(Review {
        id: result.last_insert_rowid(),
        ..review.clone()
    })
}

async fn list_reviews_sqlite(pool: &SqlitePool, store_id: i64) -> Result<Vec<ReviewWithAuthor>> {
    let rows = sqlx::query(LIST_REVIEWS_SQL)
        .bind(store_id)
        .fetch_all(pool)
        .await
        .context("Failed to list reviews")?;

    rows.iter()
        .map(|row| {
            Ok(ReviewWithAuthor {
                review: Review {
                    id: row.try_get("id")?,
                    author_id: row.try_get("author_id")?,
                    store_id: row.try_get("store_id")?,
                    text: row.try_get("text")?,
                    rating: row.try_get("rating")?,
                    created: row.try_get("created_at")?,
                },
                author_name: row.try_get("author_name")?,
            })
        })
        .collect()
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_review_mysql(pool: &MySqlPool, review: &Review) -> Result<Review> {
    let result = sqlx::query(
        r#"
        INSERT INTO reviews (author_id, store_id, rating, text, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(review.author_id)
    .bind(review.store_id)
    .bind(review.rating)
    .bind(&review.text)
    .bind(review.created)
    .execute(pool)
    .await
    .context("Failed to create review")?;

    Ok(Review {
        id: result.last_insert_id() as i64,
        ..review.clone()
    })
}

async fn list_reviews_mysql(pool: &MySqlPool, store_id: i64) -> Result<Vec<ReviewWithAuthor>> {
    let rows = sqlx::query(LIST_REVIEWS_SQL)
        .bind(store_id)
        .fetch_all(pool)
        .await
        .context("Failed to list reviews")?;

    rows.iter()
        .map(|row| {
            Ok(ReviewWithAuthor {
                review: Review {
                    id: row.try_get("id")?,
                    author_id: row.try_get("author_id")?,
                    store_id: row.try_get("store_id")?,
                    text: row.try_get("text")?,
                    rating: row.try_get("rating")?,
                    created: row.try_get("created_at")?,
                },
                author_name: row.try_get("author_name")?,
            })
        })
        .collect()
}
