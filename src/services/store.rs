//! Store service
//!
//! Business logic for stores:
//! - validation of submitted store fields
//! - unique slug assignment on create and rename
//! - paginated, tag-filtered, searched, nearby and top-rated listings
//! - owner-only editing

use crate::db::is_unique_violation;
use crate::db::repositories::{HeartRepository, ReviewRepository, StoreRepository, UserRepository};
use crate::models::{
    normalize_tags, Location, ScoredStore, Store, StoreDetail, StoreInput, StorePage, StoreSummary,
    TagCount, TopStore,
};
use crate::services::geo::{bounding_box, haversine_distance, valid_coordinates};
use crate::services::slug::{generate_slug, next_free_slug};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Stores per listing page
pub const PAGE_SIZE: i64 = 6;
/// Maximum search results
pub const SEARCH_LIMIT: usize = 5;
/// Radius of the near query in meters
pub const NEAR_MAX_DISTANCE_M: f64 = 10_000.0;
/// Maximum near results
pub const NEAR_LIMIT: usize = 10;
/// Reviews a store needs before it is ranked
pub const TOP_RATED_MIN_REVIEWS: i64 = 2;
/// Maximum top-rated results
pub const TOP_RATED_LIMIT: i64 = 10;

/// Attempts at inserting with a fresh slug after a unique-key conflict
const SLUG_ATTEMPTS: usize = 3;

pub const MSG_NAME_REQUIRED: &str = "Please enter a cool store name!";
pub const MSG_COORDINATES_REQUIRED: &str = "You must provide coordinates!";
pub const MSG_ADDRESS_REQUIRED: &str = "You must provide an address!";
pub const MSG_AUTHOR_REQUIRED: &str = "You must provide an author!";

/// Error types for store service operations
#[derive(Debug, thiserror::Error)]
pub enum StoreServiceError {
    /// One message per failed field check
    #[error("Validation error: {}", .0.join(" "))]
    Validation(Vec<String>),

    #[error("Store not found")]
    NotFound,

    /// Requester is not the store's author
    #[error("You must own a store in order to edit it!")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Store fields as submitted, before validation
#[derive(Debug, Clone, Default)]
pub struct StoreDraft {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub address: String,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
    /// Stored file name of a newly uploaded photo
    pub photo: Option<String>,
}

impl StoreDraft {
    /// Check required fields and normalise the rest.
    ///
    /// Every failing check contributes a message.
    pub fn validate(self) -> Result<StoreInput, StoreServiceError> {
        let mut errors = Vec::new();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push(MSG_NAME_REQUIRED.to_string());
        }

        let coordinates = match (self.lng, self.lat) {
            (Some(lng), Some(lat)) if valid_coordinates(lng, lat) => Some((lng, lat)),
            _ => {
                errors.push(MSG_COORDINATES_REQUIRED.to_string());
                None
            }
        };

        let address = self.address.trim().to_string();
        if address.is_empty() {
            errors.push(MSG_ADDRESS_REQUIRED.to_string());
        }

        match coordinates {
            Some((lng, lat)) if errors.is_empty() => {
                let description = self.description.trim();
                Ok(StoreInput {
                    name,
                    description: (!description.is_empty()).then(|| description.to_string()),
                    tags: normalize_tags(&self.tags),
                    location: Location::new(lng, lat, address),
                    photo: self.photo,
                })
            }
            _ => Err(StoreServiceError::Validation(errors)),
        }
    }
}

/// Store service
pub struct StoreService {
    store_repo: Arc<dyn StoreRepository>,
    review_repo: Arc<dyn ReviewRepository>,
    user_repo: Arc<dyn UserRepository>,
    heart_repo: Arc<dyn HeartRepository>,
}

impl StoreService {
    pub fn new(
        store_repo: Arc<dyn StoreRepository>,
        review_repo: Arc<dyn ReviewRepository>,
        user_repo: Arc<dyn UserRepository>,
        heart_repo: Arc<dyn HeartRepository>,
    ) -> Self {
        Self {
            store_repo,
            review_repo,
            user_repo,
            heart_repo,
        }
    }

    /// Create a store owned by `author_id`.
    ///
    /// The slug is derived from the name and made unique. Two concurrent
    /// creates with the same name can pick the same slug; the loser hits
    /// the unique index and retries with a fresh one.
    pub async fn create(&self, draft: StoreDraft, author_id: i64) -> Result<Store, StoreServiceError> {
        let input = draft.validate()?;

        if self
            .user_repo
            .get_by_id(author_id)
            .await
            .context("Failed to look up author")?
            .is_none()
        {
            return Err(StoreServiceError::Validation(vec![MSG_AUTHOR_REQUIRED.to_string()]));
        }

        let base = generate_slug(&input.name);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let slug = self.unique_slug(&base, None).await?;
            let store = Store {
                id: 0,
                name: input.name.clone(),
                slug,
                description: input.description.clone(),
                tags: input.tags.clone(),
                created: Utc::now(),
                location: input.location.clone(),
                photo: input.photo.clone(),
                author_id,
            };

            match self.store_repo.create(&store).await {
                Ok(created) => {
                    tracing::info!(store_id = created.id, slug = %created.slug, "Store created");
                    return Ok(created);
                }
                Err(e) if attempt < SLUG_ATTEMPTS && is_unique_violation(&e) => {
                    tracing::warn!(slug = %store.slug, "Slug taken concurrently, retrying");
                }
                Err(e) => return Err(e.context("Failed to create store").into()),
            }
        }
    }

    /// One page of stores, newest first.
    ///
    /// Pages below 1 are treated as 1. A page past the end comes back
    /// empty with `pages` set, so the caller can redirect. That includes
    /// pages so large their offset does not fit in an `i64`.
    pub async fn get_page(&self, page: i64) -> Result<StorePage, StoreServiceError> {
        let page = page.max(1);

        let (stores, count) = match (page - 1).checked_mul(PAGE_SIZE) {
            Some(skip) => futures::try_join!(
                self.store_repo.list_page(PAGE_SIZE, skip),
                self.store_repo.count()
            ),
            None => self.store_repo.count().await.map(|count| (Vec::new(), count)),
        }
        .context("Failed to load store page")?;

        Ok(StorePage {
            stores,
            page,
            pages: (count + PAGE_SIZE - 1) / PAGE_SIZE,
            count,
        })
    }

    /// Store by slug with its author and reviews
    pub async fn find_by_slug(&self, slug: &str) -> Result<StoreDetail, StoreServiceError> {
        let store = self
            .store_repo
            .get_by_slug(slug)
            .await
            .context("Failed to get store by slug")?
            .ok_or(StoreServiceError::NotFound)?;

        let (author, reviews) = futures::try_join!(
            self.user_repo.get_by_id(store.author_id),
            self.review_repo.list_for_store(store.id)
        )
        .context("Failed to load store details")?;

        Ok(StoreDetail {
            store,
            author: author.map(|u| u.summary()),
            reviews,
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Store, StoreServiceError> {
        self.store_repo
            .get_by_id(id)
            .await
            .context("Failed to get store")?
            .ok_or(StoreServiceError::NotFound)
    }

    /// Stores with `tag` (any tag when `None`) and the global tag facets
    pub async fn find_by_tag(
        &self,
        tag: Option<&str>,
    ) -> Result<(Vec<Store>, Vec<TagCount>), StoreServiceError> {
        let result = futures::try_join!(self.store_repo.list_by_tag(tag), self.store_repo.tag_counts())
            .context("Failed to load tag listing")?;
        Ok(result)
    }

    /// Tag counts, most used first
    pub async fn tag_facets(&self) -> Result<Vec<TagCount>, StoreServiceError> {
        Ok(self.store_repo.tag_counts().await.context("Failed to count tags")?)
    }

    /// Text search over name and description, best matches first
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredStore>, StoreServiceError> {
        let terms = search_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self
            .store_repo
            .search_candidates(&terms)
            .await
            .context("Failed to search stores")?;

        let mut scored: Vec<ScoredStore> = candidates
            .into_iter()
            .map(|store| {
                let score = relevance(&store, &terms);
                ScoredStore { store, score }
            })
            .filter(|s| s.score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.store.created.cmp(&a.store.created))
        });
        scored.truncate(SEARCH_LIMIT);
        Ok(scored)
    }

    /// Stores within 10 km of `(lng, lat)`, nearest first
    pub async fn near(&self, lng: f64, lat: f64) -> Result<Vec<StoreSummary>, StoreServiceError> {
        if !valid_coordinates(lng, lat) {
            return Err(StoreServiceError::Validation(vec![MSG_COORDINATES_REQUIRED.to_string()]));
        }

        let bbox = bounding_box((lng, lat), NEAR_MAX_DISTANCE_M);
        let candidates = self
            .store_repo
            .in_bounding_box(&bbox)
            .await
            .context("Failed to query nearby stores")?;

        let mut within: Vec<(f64, Store)> = candidates
            .into_iter()
            .map(|s| (haversine_distance((lng, lat), (s.location.lng(), s.location.lat())), s))
            .filter(|(d, _)| *d <= NEAR_MAX_DISTANCE_M)
            .collect();
        within.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(within
            .into_iter()
            .take(NEAR_LIMIT)
            .map(|(_, s)| StoreSummary::from(s))
            .collect())
    }

    /// Best-rated stores with at least two reviews
    pub async fn top_rated(&self) -> Result<Vec<TopStore>, StoreServiceError> {
        Ok(self
            .store_repo
            .top_rated(TOP_RATED_MIN_REVIEWS, TOP_RATED_LIMIT)
            .await
            .context("Failed to rank stores")?)
    }

    /// Load a store for editing by `requester_id`
    pub async fn get_for_edit(&self, id: i64, requester_id: i64) -> Result<Store, StoreServiceError> {
        let store = self.get_by_id(id).await?;
        confirm_owner(&store, requester_id)?;
        Ok(store)
    }

    /// Apply `draft` to store `id` on behalf of `requester_id`.
    ///
    /// Only the author may update. The slug is recomputed only when the
    /// name changes; the photo is kept when the draft carries none.
    pub async fn update(
        &self,
        id: i64,
        draft: StoreDraft,
        requester_id: i64,
    ) -> Result<Store, StoreServiceError> {
        let existing = self.get_by_id(id).await?;
        confirm_owner(&existing, requester_id)?;
        let input = draft.validate()?;

        let rename = input.name != existing.name;
        let base = generate_slug(&input.name);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let slug = if rename {
                self.unique_slug(&base, Some(existing.id)).await?
            } else {
                existing.slug.clone()
            };

            let store = Store {
                name: input.name.clone(),
                slug,
                description: input.description.clone(),
                tags: input.tags.clone(),
                location: input.location.clone(),
                photo: input.photo.clone().or_else(|| existing.photo.clone()),
                ..existing.clone()
            };

            match self.store_repo.update(&store).await {
                Ok(Some(updated)) => {
                    tracing::info!(store_id = updated.id, slug = %updated.slug, "Store updated");
                    return Ok(updated);
                }
                Ok(None) => return Err(StoreServiceError::NotFound),
                Err(e) if rename && attempt < SLUG_ATTEMPTS && is_unique_violation(&e) => {
                    tracing::warn!(slug = %store.slug, "Slug taken concurrently, retrying");
                }
                Err(e) => return Err(e.context("Failed to update store").into()),
            }
        }
    }

    /// Stores the user has hearted, newest store first
    pub async fn hearted_by(&self, user_id: i64) -> Result<Vec<Store>, StoreServiceError> {
        let ids = self
            .heart_repo
            .list_for_user(user_id)
            .await
            .context("Failed to load hearts")?;
        Ok(self
            .store_repo
            .list_by_ids(&ids)
            .await
            .context("Failed to load hearted stores")?)
    }

    async fn unique_slug(&self, base: &str, exclude_id: Option<i64>) -> Result<String, StoreServiceError> {
        let existing = self
            .store_repo
            .slugs_with_prefix(base, exclude_id)
            .await
            .context("Failed to check existing slugs")?;
        Ok(next_free_slug(base, &existing))
    }
}

/// Fail with [`StoreServiceError::Forbidden`] unless `user_id` authored `store`
pub fn confirm_owner(store: &Store, user_id: i64) -> Result<(), StoreServiceError> {
    if store.author_id == user_id {
        Ok(())
    } else {
        Err(StoreServiceError::Forbidden)
    }
}

/// Lower-cased alphanumeric words of `text`
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Distinct search terms of a query, in order
pub fn search_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in words(query) {
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// Number of words in name and description that start with a term
fn relevance(store: &Store, terms: &[String]) -> f64 {
    let description = store.description.as_deref().unwrap_or_default();
    words(&store.name)
        .chain(words(description))
        .filter(|word| terms.iter().any(|t| word.starts_with(t.as_str())))
        .count() as f64
}
