//! Server-rendered page plumbing
//!
//! Page handlers take a [`PageRequest`], render through [`render`] and fail
//! with [`PageError`]. A failure either redirects with a flash notice or
//! becomes a 500 that [`error_pages`] turns into the styled error page.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use std::convert::Infallible;
use tera::Context as TeraContext;

use crate::api::flash::{append_cookie, clear_flash_cookie, read_flash, redirect_with_flash};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::models::User;
use crate::views::{Flash, PageVars};

const MSG_INTERNAL: &str = "Something went wrong on our end. Please try again.";

/// What every page handler needs from the request
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub user: Option<User>,
    pub flash: Option<Flash>,
    pub path: String,
    /// Flash came from the cookie and must be cleared
    from_cookie: bool,
}

impl PageRequest {
    /// Show `flash` on this render instead of the incoming one
    pub fn with_flash(mut self, flash: Flash) -> Self {
        self.flash = Some(flash);
        self
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

impl<S> FromRequestParts<S> for PageRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let flash = read_flash(&parts.headers);
        Ok(PageRequest {
            user: parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| u.0.clone()),
            from_cookie: flash.is_some(),
            flash,
            path: parts.uri.path().to_string(),
        })
    }
}

/// Failure of a page route
#[derive(Debug)]
pub enum PageError {
    /// Send the visitor to `to` with a notice
    Redirect { to: String, flash: Flash },
    /// Unexpected failure; logged, then rendered as the error page
    Internal(anyhow::Error),
}

impl PageError {
    pub fn redirect(to: impl Into<String>, flash: Flash) -> Self {
        PageError::Redirect {
            to: to.into(),
            flash,
        }
    }
}

impl From<anyhow::Error> for PageError {
    fn from(err: anyhow::Error) -> Self {
        PageError::Internal(err)
    }
}

/// Marks a 500 that [`error_pages`] should render
#[derive(Debug, Clone, Copy)]
struct ErrorPage;

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        match self {
            PageError::Redirect { to, flash } => redirect_with_flash(&to, flash),
            PageError::Internal(err) => {
                tracing::error!("Page request failed: {:#}", err);
                let mut response = (StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL).into_response();
                response.extensions_mut().insert(ErrorPage);
                response
            }
        }
    }
}

/// Replace marked 500 responses with the rendered error page
pub async fn error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.summary());
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    if response.extensions().get::<ErrorPage>().is_none() {
        return response;
    }

    let vars = PageVars::new("Error", &state.config.views.site_name, path).with_user(user);
    let html = state.views.render_error(MSG_INTERNAL, &vars);
    (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
}

/// Render `template` as a full page
pub fn render(
    state: &AppState,
    req: &PageRequest,
    template: &str,
    title: &str,
    context: &TeraContext,
) -> Result<Response, PageError> {
    let vars = PageVars::new(title, &state.config.views.site_name, &req.path)
        .with_user(req.user.as_ref().map(|u| u.summary()))
        .with_flash(req.flash.clone());

    let html = state.views.render_page(template, context, &vars)?;
    let mut response = Html(html).into_response();
    if req.from_cookie {
        append_cookie(&mut response, &clear_flash_cookie());
    }
    Ok(response)
}
