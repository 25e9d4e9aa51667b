//! Review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// A user's rating and comment on a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    #[serde(rename = "author")]
    pub author_id: i64,
    #[serde(rename = "store")]
    pub store_id: i64,
    pub text: String,
    pub rating: i32,
    pub created: DateTime<Utc>,
}

impl Review {
    /// Build an unsaved review. Author and store come from the caller's
    /// session and route, never from the submitted body.
    pub fn new(author_id: i64, store_id: i64, input: ReviewInput) -> Self {
        Self {
            id: 0,
            author_id,
            store_id,
            text: input.text,
            rating: input.rating,
            created: Utc::now(),
        }
    }
}

/// Body of a submitted review
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewInput {
    pub text: String,
    pub rating: i32,
}

/// Review joined with its author's display name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    pub review: Review,
    pub author_name: String,
}
