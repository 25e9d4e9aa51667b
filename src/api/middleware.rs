//! API middleware
//!
//! Contains:
//! - Application state
//! - Session resolution (`optional_auth`) and the two login gates:
//!   `require_login` for pages, `require_auth` for JSON endpoints
//! - The JSON error body used by `/api/*`

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::flash::redirect_with_flash;
use crate::config::Config;
use crate::db::repositories::{
    SqlxHeartRepository, SqlxReviewRepository, SqlxSessionRepository, SqlxStoreRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    HeartService, HeartServiceError, Mailer, ReviewService, StoreService, StoreServiceError,
    UserService,
};
use crate::views::{Flash, ViewEngine};

pub const SESSION_COOKIE: &str = "session";

pub const MSG_LOGIN_REQUIRED: &str = "Oops, you must be logged in to do that!";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub store_service: Arc<StoreService>,
    pub review_service: Arc<ReviewService>,
    pub heart_service: Arc<HeartService>,
    pub views: Arc<ViewEngine>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn new(
        pool: DynDatabasePool,
        config: Config,
        views: ViewEngine,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let store_repo = SqlxStoreRepository::boxed(pool.clone());
        let review_repo = SqlxReviewRepository::boxed(pool.clone());
        let heart_repo = SqlxHeartRepository::boxed(pool);

        let user_service = UserService::new(user_repo.clone(), session_repo, mailer)
            .with_session_expiration(config.session.expiration_days);
        let store_service = StoreService::new(
            store_repo.clone(),
            review_repo.clone(),
            user_repo,
            heart_repo.clone(),
        );
        let review_service = ReviewService::new(review_repo, store_repo.clone());
        let heart_service = HeartService::new(heart_repo, store_repo);

        Self {
            user_service: Arc::new(user_service),
            store_service: Arc::new(store_service),
            review_service: Arc::new(review_service),
            heart_service: Arc::new(heart_service),
            views: Arc::new(views),
            config: Arc::new(config),
        }
    }

    /// `Set-Cookie` value for a new session
    pub fn session_cookie(&self, session_id: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            session_id,
            self.config.session.expiration_days * 24 * 60 * 60
        )
    }
}

/// `Set-Cookie` value ending the session
pub fn clear_session_cookie() -> String {
    format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log `err` and hide it behind a generic message
    fn internal(err: anyhow::Error) -> Self {
        tracing::error!("Request failed: {:#}", err);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<StoreServiceError> for ApiError {
    fn from(err: StoreServiceError) -> Self {
        match err {
            StoreServiceError::Validation(messages) => ApiError::with_details(
                "VALIDATION_ERROR",
                messages.join(" "),
                serde_json::json!(messages),
            ),
            StoreServiceError::NotFound => ApiError::not_found("That store doesn't exist!"),
            StoreServiceError::Forbidden => ApiError::forbidden(err.to_string()),
            StoreServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

impl From<HeartServiceError> for ApiError {
    fn from(err: HeartServiceError) -> Self {
        match err {
            HeartServiceError::StoreNotFound => ApiError::not_found("That store doesn't exist!"),
            HeartServiceError::Internal(e) => ApiError::internal(e),
        }
    }
}

/// Value of cookie `name`
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Extract session token from request
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    read_cookie(headers, SESSION_COOKIE).filter(|token| !token.is_empty())
}

/// Resolve the session, if any, into an [`AuthenticatedUser`] extension
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session validation failed: {}", e),
        }
    }
    next.run(request).await
}

/// Page gate: anonymous visitors are sent to the login form
pub async fn require_login(request: Request, next: Next) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return redirect_with_flash("/login", Flash::error(MSG_LOGIN_REQUIRED));
    }
    next.run(request).await
}

/// JSON gate: anonymous callers get a 401 body
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(ApiError::unauthorized(MSG_LOGIN_REQUIRED));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn create_request_with_cookie(cookie: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(
            extract_session_token(request.headers()),
            Some("test-token-123".to_string())
        );
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let request = create_request_with_cookie("flash=x; session=test-token-456");
        assert_eq!(
            extract_session_token(request.headers()),
            Some("test-token-456".to_string())
        );
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer bearer-token")
            .header(header::COOKIE, "session=cookie-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_session_token(request.headers()),
            Some("bearer-token".to_string())
        );
    }

    #[test]
    fn test_extract_session_token_none() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_session_token(request.headers()).is_none());

        let cleared = create_request_with_cookie("session=");
        assert!(extract_session_token(cleared.headers()).is_none());
    }

    #[test]
    fn test_read_cookie_exact_name() {
        let request = create_request_with_cookie("mysession=a; session=b");
        assert_eq!(read_cookie(request.headers(), "session"), Some("b".to_string()));
        assert_eq!(read_cookie(request.headers(), "missing"), None);
    }

    #[test]
    fn test_api_error_status_codes() {
        let cases = [
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::internal_error("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_store_errors_map_to_api_errors() {
        let error: ApiError =
            StoreServiceError::Validation(vec!["a".into(), "b".into()]).into();
        assert_eq!(error.error.code, "VALIDATION_ERROR");
        assert_eq!(error.error.message, "a b");

        let error: ApiError = StoreServiceError::Forbidden.into();
        assert_eq!(error.error.code, "FORBIDDEN");

        let error: ApiError = HeartServiceError::StoreNotFound.into();
        assert_eq!(error.error.code, "NOT_FOUND");
    }
}
