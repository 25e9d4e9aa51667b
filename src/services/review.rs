//! Review service

use crate::db::repositories::{ReviewRepository, StoreRepository};
use crate::models::{Review, ReviewInput, ReviewWithAuthor, Store, MAX_RATING, MIN_RATING};
use anyhow::Context;
use std::sync::Arc;

pub const MSG_RATING_RANGE: &str = "You must supply a rating between 1 and 5!";
pub const MSG_TEXT_REQUIRED: &str = "Your review must have text!";

/// Error types for review service operations
#[derive(Debug, thiserror::Error)]
pub enum ReviewServiceError {
    #[error("Validation error: {}", .0.join(" "))]
    Validation(Vec<String>),

    #[error("Store not found")]
    StoreNotFound,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Review fields as submitted
#[derive(Debug, Clone, Default)]
pub struct ReviewDraft {
    pub text: String,
    pub rating: Option<i32>,
}

impl ReviewDraft {
    pub fn validate(self) -> Result<ReviewInput, ReviewServiceError> {
        let mut errors = Vec::new();

        let rating = self
            .rating
            .filter(|r| (MIN_RATING..=MAX_RATING).contains(r));
        if rating.is_none() {
            errors.push(MSG_RATING_RANGE.to_string());
        }

        let text = self.text.trim().to_string();
        if text.is_empty() {
            errors.push(MSG_TEXT_REQUIRED.to_string());
        }

        match rating {
            Some(rating) if errors.is_empty() => Ok(ReviewInput { text, rating }),
            _ => Err(ReviewServiceError::Validation(errors)),
        }
    }
}

pub struct ReviewService {
    review_repo: Arc<dyn ReviewRepository>,
    store_repo: Arc<dyn StoreRepository>,
}

impl ReviewService {
    pub fn new(review_repo: Arc<dyn ReviewRepository>, store_repo: Arc<dyn StoreRepository>) -> Self {
        Self {
            review_repo,
            store_repo,
        }
    }

    /// Add a review by `author_id` to store `store_id`.
    ///
    /// Both ids come from the session and the route; the draft has no way
    /// to name another author or store. Returns the review and the store it
    /// belongs to.
    pub async fn add_review(
        &self,
        store_id: i64,
        author_id: i64,
        draft: ReviewDraft,
    ) -> Result<(Review, Store), ReviewServiceError> {
        let input = draft.validate()?;

        let store = self
            .store_repo
            .get_by_id(store_id)
            .await
            .context("Failed to get store")?
            .ok_or(ReviewServiceError::StoreNotFound)?;

        let review = self
            .review_repo
            .create(&Review::new(author_id, store.id, input))
            .await
            .context("Failed to save review")?;

        tracing::info!(review_id = review.id, store_id = store.id, "Review added");
        Ok((review, store))
    }

    /// Reviews of a store, newest first
    pub async fn reviews_for_store(
        &self,
        store_id: i64,
    ) -> Result<Vec<ReviewWithAuthor>, ReviewServiceError> {
        Ok(self
            .review_repo
            .list_for_store(store_id)
            .await
            .context("Failed to list reviews")?)
    }
}
