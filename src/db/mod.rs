//! Database layer
//!
//! SQLite (default, single-file deployment) and MySQL are both supported
//! behind the [`DatabasePool`] trait. Repositories receive the pool
//! explicitly; nothing is registered globally.
//!
//! # Usage
//!
//! ```ignore
//! use delicious::config::DatabaseConfig;
//! use delicious::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// Whether an error raised by a repository was a UNIQUE constraint violation.
///
/// Looks through `anyhow` context layers down to the driver error.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map_or(false, |db_err| db_err.is_unique_violation())
    })
}
