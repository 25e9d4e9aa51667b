//! Authentication pages
//!
//! - GET/POST /login
//! - GET/POST /register
//! - GET /logout

use axum::{
    extract::State,
    http::HeaderMap,
    response::Response,
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::flash::{append_cookie, redirect, redirect_with_flash};
use crate::api::middleware::{clear_session_cookie, extract_session_token, AppState};
use crate::api::page::{render, PageError, PageRequest};
use crate::services::{LoginInput, RegisterInput, UserServiceError};
use crate::views::Flash;

pub const MSG_LOGIN_FAILED: &str = "Failed Login!";
pub const MSG_LOGGED_IN: &str = "You are now logged in.";
pub const MSG_LOGGED_OUT: &str = "You are now logged out!";
pub const MSG_EMAIL_TAKEN: &str = "A user with the given email is already registered";

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "password-confirm")]
    pub password_confirm: String,
}

/// Values echoed back into the register form
#[derive(Debug, Default, Serialize)]
struct RegisterValues {
    name: String,
    email: String,
}

/// GET /login
pub async fn login_form(State(state): State<AppState>, req: PageRequest) -> Result<Response, PageError> {
    render(&state, &req, "login.html", "Login", &TeraContext::new())
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let session = match state
        .user_service
        .login(LoginInput::new(form.email, form.password))
        .await
    {
        Ok(session) => session,
        Err(UserServiceError::AuthenticationError(_)) => {
            return Err(PageError::redirect("/login", Flash::error(MSG_LOGIN_FAILED)));
        }
        Err(e) => return Err(PageError::Internal(e.into())),
    };

    let mut response = redirect_with_flash("/", Flash::success(MSG_LOGGED_IN));
    append_cookie(&mut response, &state.session_cookie(&session.id));
    Ok(response)
}

/// GET /register
pub async fn register_form(
    State(state): State<AppState>,
    req: PageRequest,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("form", &RegisterValues::default());
    render(&state, &req, "register.html", "Register", &context)
}

/// POST /register
///
/// A rejected form is rendered again with the entered name and email and
/// every problem listed.
pub async fn register(
    State(state): State<AppState>,
    req: PageRequest,
    Form(form): Form<RegisterForm>,
) -> Result<Response, PageError> {
    let values = RegisterValues {
        name: form.name.clone(),
        email: form.email.clone(),
    };
    let input = RegisterInput::new(form.name, form.email, form.password, form.password_confirm);

    let flash = match state.user_service.register(input).await {
        Ok((_, session)) => {
            let mut response = redirect("/");
            append_cookie(&mut response, &state.session_cookie(&session.id));
            return Ok(response);
        }
        Err(UserServiceError::ValidationError(messages)) => Flash::errors(messages),
        Err(UserServiceError::UserExists(_)) => Flash::error(MSG_EMAIL_TAKEN),
        Err(e) => return Err(PageError::Internal(e.into())),
    };

    let mut context = TeraContext::new();
    context.insert("form", &values);
    render(&state, &req.with_flash(flash), "register.html", "Register", &context)
}

/// GET /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, PageError> {
    if let Some(token) = extract_session_token(&headers) {
        state
            .user_service
            .logout(&token)
            .await
            .map_err(|e| PageError::Internal(e.into()))?;
    }

    let mut response = redirect_with_flash("/", Flash::success(MSG_LOGGED_OUT));
    append_cookie(&mut response, &clear_session_cookie());
    Ok(response)
}
