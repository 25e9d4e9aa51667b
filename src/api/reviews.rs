//! POST /reviews/{id} - review a store

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Uri},
    response::Response,
    Form,
};
use serde::Deserialize;

use crate::api::flash::redirect_with_flash;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::page::PageError;
use crate::api::stores::MSG_STORE_MISSING;
use crate::services::{ReviewDraft, ReviewServiceError};
use crate::views::Flash;

#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rating: Option<String>,
}

/// Path and query of the `Referer`, so redirects stay on this site
fn referer_path(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let uri: Uri = referer.parse().ok()?;
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .filter(|p| p.starts_with('/') && !p.starts_with("//"))
}

pub async fn add_review(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(store_id): Path<i64>,
    headers: HeaderMap,
    Form(form): Form<ReviewForm>,
) -> Result<Response, PageError> {
    let back = referer_path(&headers);
    let draft = ReviewDraft {
        text: form.text,
        rating: form.rating.and_then(|r| r.trim().parse().ok()),
    };

    // Author and store come from the session and the route, never the form
    match state.review_service.add_review(store_id, user.id, draft).await {
        Ok((_, store)) => Ok(redirect_with_flash(
            &back.unwrap_or_else(|| format!("/store/{}", store.slug)),
            Flash::success("Review saved!"),
        )),
        Err(ReviewServiceError::Validation(messages)) => Err(PageError::redirect(
            back.unwrap_or_else(|| "/stores".to_string()),
            Flash::errors(messages),
        )),
        Err(ReviewServiceError::StoreNotFound) => {
            Err(PageError::redirect("/stores", Flash::error(MSG_STORE_MISSING)))
        }
        Err(ReviewServiceError::Internal(e)) => Err(PageError::Internal(e)),
    }
}
