//! HTTP layer - routing and handlers
//!
//! Pages are rendered on the server and report problems through flash
//! notices. The few JSON endpoints under `/api` answer with
//! `{error:{code,message}}` bodies instead.

pub mod account;
pub mod auth;
pub mod flash;
pub mod middleware;
pub mod page;
pub mod reviews;
pub mod store_api;
pub mod stores;
pub mod upload;


use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};
pub use page::{PageError, PageRequest};

/// Directory served at `/public`
pub const PUBLIC_DIR: &str = "public";

/// Multipart overhead allowed on top of the photo size limit
const FORM_OVERHEAD: u64 = 64 * 1024;

/// Pages open to everyone
fn public_pages() -> Router<AppState> {
    Router::new()
        .route("/", get(stores::index))
        .route("/stores", get(stores::index))
        .route("/stores/page/{page}", get(stores::page))
        .route("/store/{slug}", get(stores::detail))
        .route("/tags", get(stores::tags))
        .route("/tags/{tag}", get(stores::tag))
        .route("/top", get(stores::top))
        .route("/map", get(stores::map))
        .route("/login", get(auth::login_form).post(auth::login))
        .route("/register", get(auth::register_form).post(auth::register))
        .route("/logout", get(auth::logout))
        .route("/account/forgot", get(account::forgot_form).post(account::forgot))
        .route("/account/reset/{token}", get(account::reset_form).post(account::reset))
}

/// Pages that send anonymous visitors to the login form
fn member_pages() -> Router<AppState> {
    Router::new()
        .route("/add", get(stores::add_form).post(stores::create))
        .route("/add/{id}", post(stores::update))
        .route("/stores/{id}/edit", get(stores::edit_form))
        .route("/hearts", get(stores::hearts))
        .route("/reviews/{id}", post(reviews::add_review))
        .route("/account", get(account::account_form).post(account::update_account))
        .route_layer(axum_middleware::from_fn(middleware::require_login))
}

/// JSON endpoints
fn api_routes() -> Router<AppState> {
    let protected = Router::new()
        .route("/stores/{id}/heart", post(store_api::heart))
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    Router::new()
        .route("/search", get(store_api::search))
        .route("/stores/near", get(store_api::near))
        .merge(protected)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_file_size.saturating_add(FORM_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .merge(public_pages())
        .merge(member_pages())
        .nest("/api", api_routes())
        .nest_service("/public", ServeDir::new(Path::new(PUBLIC_DIR)))
        .nest_service("/uploads", ServeDir::new(&state.config.upload.path))
        .layer(axum_middleware::from_fn_with_state(state.clone(), page::error_pages))
        // Runs before the error pages so they can show who is logged in
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
