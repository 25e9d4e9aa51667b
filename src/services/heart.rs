//! Heart service
//!
//! Users heart stores to bookmark them. A toggle is atomic per statement,
//! so concurrent toggles never leave duplicates behind.

use crate::db::repositories::{HeartRepository, StoreRepository};
use crate::models::UserHearts;
use anyhow::Context;
use std::sync::Arc;

/// Error types for heart service operations
#[derive(Debug, thiserror::Error)]
pub enum HeartServiceError {
    #[error("Store not found")]
    StoreNotFound,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub struct HeartService {
    heart_repo: Arc<dyn HeartRepository>,
    store_repo: Arc<dyn StoreRepository>,
}

impl HeartService {
    pub fn new(heart_repo: Arc<dyn HeartRepository>, store_repo: Arc<dyn StoreRepository>) -> Self {
        Self {
            heart_repo,
            store_repo,
        }
    }

    /// Heart `store_id` for the user, or unheart it if already hearted
    pub async fn toggle_heart(
        &self,
        user_id: i64,
        store_id: i64,
    ) -> Result<UserHearts, HeartServiceError> {
        if self
            .store_repo
            .get_by_id(store_id)
            .await
            .context("Failed to get store")?
            .is_none()
        {
            return Err(HeartServiceError::StoreNotFound);
        }

        let hearts = self
            .heart_repo
            .toggle(user_id, store_id)
            .await
            .context("Failed to toggle heart")?;

        tracing::debug!(user_id, store_id, hearted = hearts.contains(&store_id), "Heart toggled");
        Ok(UserHearts { user_id, hearts })
    }

    pub async fn hearts_of(&self, user_id: i64) -> Result<UserHearts, HeartServiceError> {
        let hearts = self
            .heart_repo
            .list_for_user(user_id)
            .await
            .context("Failed to load hearts")?;
        Ok(UserHearts { user_id, hearts })
    }
}
