//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one entity.

pub mod heart;
pub mod review;
pub mod session;
pub mod store;
pub mod user;

pub use heart::{HeartRepository, SqlxHeartRepository};
pub use review::{ReviewRepository, SqlxReviewRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use store::{BoundingBox, SqlxStoreRepository, StoreRepository};
pub use user::{SqlxUserRepository, UserRepository};
