//! Data models
//!
//! Plain data carried between repositories, services and handlers:
//! - Database entities (User, Session, Store, Review)
//! - Query projections (StoreSummary, TopStore, TagCount, ScoredStore)
//! - Validated write inputs (StoreInput, ReviewInput)

mod review;
mod session;
mod store;
mod user;

pub use review::{Review, ReviewInput, ReviewWithAuthor, MAX_RATING, MIN_RATING};
pub use session::Session;
pub use store::{
    normalize_tags, Location, PointKind, ScoredStore, Store, StoreDetail, StoreInput, StorePage,
    StoreSummary, TagCount, TopStore,
};
pub use user::{User, UserHearts, UserSummary};
