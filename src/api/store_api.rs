//! JSON endpoints used by the client-side widgets
//!
//! - GET /api/search?q= - up to 5 scored matches
//! - GET /api/stores/near?lat=&lng= - up to 10 stores within 10 km
//! - POST /api/stores/{id}/heart - toggle a heart (authenticated)

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ScoredStore, StoreSummary, UserHearts};
use crate::services::store::MSG_COORDINATES_REQUIRED;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Coordinates arrive as text so bad values get a JSON error body
#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

impl NearQuery {
    fn coordinates(&self) -> Option<(f64, f64)> {
        let lng = self.lng.as_deref()?.trim().parse().ok()?;
        let lat = self.lat.as_deref()?.trim().parse().ok()?;
        Some((lng, lat))
    }
}

/// GET /api/search
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ScoredStore>>, ApiError> {
    Ok(Json(state.store_service.search(&query.q).await?))
}

/// GET /api/stores/near
pub async fn near(
    State(state): State<AppState>,
    Query(query): Query<NearQuery>,
) -> Result<Json<Vec<StoreSummary>>, ApiError> {
    let (lng, lat) = query
        .coordinates()
        .ok_or_else(|| ApiError::validation_error(MSG_COORDINATES_REQUIRED))?;
    Ok(Json(state.store_service.near(lng, lat).await?))
}

/// POST /api/stores/{id}/heart
pub async fn heart(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(store_id): Path<i64>,
) -> Result<Json<UserHearts>, ApiError> {
    Ok(Json(state.heart_service.toggle_heart(user.id, store_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_query_parses_coordinates() {
        let query = NearQuery {
            lat: Some(" 43.65 ".into()),
            lng: Some("-79.38".into()),
        };
        assert_eq!(query.coordinates(), Some((-79.38, 43.65)));
    }

    #[test]
    fn test_near_query_rejects_missing_or_garbage() {
        let missing = NearQuery {
            lat: Some("43.65".into()),
            lng: None,
        };
        assert_eq!(missing.coordinates(), None);

        let garbage = NearQuery {
            lat: Some("north".into()),
            lng: Some("-79.38".into()),
        };
        assert_eq!(garbage.coordinates(), None);
    }
}
