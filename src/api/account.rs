//! Account pages
//!
//! - GET/POST /account - edit name and email
//! - GET/POST /account/forgot - request a reset link
//! - GET/POST /account/reset/{token} - choose a new password

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Response,
    Form,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::flash::{append_cookie, redirect_with_flash};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::page::{render, PageError, PageRequest};
use crate::api::auth::MSG_EMAIL_TAKEN;
use crate::services::UserServiceError;
use crate::views::Flash;

pub const MSG_PROFILE_UPDATED: &str = "Updated the profile!";
pub const MSG_ACCOUNT_MISSING: &str = "We can't find your account.";
pub const MSG_RESET_SENT: &str = "You have been emailed a password reset.";
pub const MSG_RESET_INVALID: &str = "Password reset is invalid or has expired.";
pub const MSG_RESET_MISMATCH: &str = "Passwords do not match!";
pub const MSG_RESET_DONE: &str = "Nice! Your password has been reset and you are now logged in!";

#[derive(Debug, Deserialize)]
pub struct AccountForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotForm {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetForm {
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "password-confirm")]
    pub password_confirm: String,
}

/// GET /account
pub async fn account_form(
    State(state): State<AppState>,
    req: PageRequest,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("account", &user);
    render(&state, &req, "account.html", "Edit Your Account", &context)
}

/// POST /account
pub async fn update_account(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Form(form): Form<AccountForm>,
) -> Result<Response, PageError> {
    match state
        .user_service
        .update_account(user.id, &form.name, &form.email)
        .await
    {
        Ok(_) => Ok(redirect_with_flash("/account", Flash::success(MSG_PROFILE_UPDATED))),
        Err(UserServiceError::ValidationError(messages)) => {
            Err(PageError::redirect("/account", Flash::errors(messages)))
        }
        Err(UserServiceError::UserExists(_)) => {
            Err(PageError::redirect("/account", Flash::error(MSG_EMAIL_TAKEN)))
        }
        Err(e) => Err(PageError::Internal(e.into())),
    }
}

/// GET /account/forgot
pub async fn forgot_form(State(state): State<AppState>, req: PageRequest) -> Result<Response, PageError> {
    render(&state, &req, "forgot.html", "Forgot Password", &TeraContext::new())
}

/// Origin reset links are built on: the configured public URL, else the
/// request's `Host`
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = state.config.server.public_url.as_deref().filter(|u| !u.is_empty()) {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

/// POST /account/forgot
pub async fn forgot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ForgotForm>,
) -> Result<Response, PageError> {
    match state
        .user_service
        .forgot_password(&form.email, &base_url(&state, &headers))
        .await
    {
        Ok(()) => Ok(redirect_with_flash("/login", Flash::success(MSG_RESET_SENT))),
        Err(UserServiceError::AccountNotFound) => {
            Err(PageError::redirect("/login", Flash::error(MSG_ACCOUNT_MISSING)))
        }
        Err(e) => Err(PageError::Internal(e.into())),
    }
}

/// GET /account/reset/{token}
pub async fn reset_form(
    State(state): State<AppState>,
    req: PageRequest,
    Path(token): Path<String>,
) -> Result<Response, PageError> {
    match state.user_service.validate_reset_token(&token).await {
        Ok(_) => {
            let mut context = TeraContext::new();
            context.insert("token", &token);
            render(&state, &req, "reset.html", "Reset your Password", &context)
        }
        Err(UserServiceError::InvalidOrExpiredToken) => {
            Err(PageError::redirect("/login", Flash::error(MSG_RESET_INVALID)))
        }
        Err(e) => Err(PageError::Internal(e.into())),
    }
}

/// POST /account/reset/{token}
pub async fn reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Form(form): Form<ResetForm>,
) -> Result<Response, PageError> {
    let back = format!("/account/reset/{}", urlencoding::encode(&token));

    match state
        .user_service
        .reset_password(&token, &form.password, &form.password_confirm)
        .await
    {
        Ok((_, session)) => {
            let mut response = redirect_with_flash("/", Flash::success(MSG_RESET_DONE));
            append_cookie(&mut response, &state.session_cookie(&session.id));
            Ok(response)
        }
        Err(UserServiceError::PasswordMismatch) => {
            Err(PageError::redirect(back, Flash::error(MSG_RESET_MISMATCH)))
        }
        Err(UserServiceError::ValidationError(messages)) => {
            Err(PageError::redirect(back, Flash::errors(messages)))
        }
        Err(UserServiceError::InvalidOrExpiredToken) => {
            Err(PageError::redirect("/login", Flash::error(MSG_RESET_INVALID)))
        }
        Err(e) => Err(PageError::Internal(e.into())),
    }
}
