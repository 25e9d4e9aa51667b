//! User service
//!
//! Implements business logic for accounts:
//! - registration and login with Argon2 password hashes
//! - opaque session tokens with a fixed lifetime
//! - profile updates
//! - the forgot/reset password flow with one-hour, single-use tokens

use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};
use crate::services::email::{Mail, Mailer};
use crate::services::password::{generate_reset_token, hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// How long a password-reset token stays valid
pub const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub const MSG_NAME_REQUIRED: &str = "You must supply a name!";
pub const MSG_EMAIL_INVALID: &str = "That Email is not valid!";
pub const MSG_PASSWORD_BLANK: &str = "Password Cannot be Blank!";
pub const MSG_CONFIRM_BLANK: &str = "Confirmed Password cannot be blank!";
pub const MSG_PASSWORDS_DIFFER: &str = "Oops! Your passwords do not match";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// One message per failed field check
    #[error("Validation error: {}", .0.join(" "))]
    ValidationError(Vec<String>),

    /// Email already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    /// No account for the given email
    #[error("Account not found")]
    AccountNotFound,

    /// New password and confirmation differ
    #[error("Passwords do not match")]
    PasswordMismatch,

    /// Reset token unknown, already used, or past its expiry
    #[error("Password reset is invalid or has expired")]
    InvalidOrExpiredToken,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    mailer: Arc<dyn Mailer>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            mailer,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    /// Use a custom session lifetime
    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days;
        self
    }

    /// Register a new user and log them in.
    ///
    /// # Errors
    ///
    /// - `ValidationError` with every failed field check
    /// - `UserExists` if the email is already registered
    pub async fn register(&self, input: RegisterInput) -> Result<(User, Session), UserServiceError> {
        let (name, email) = validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(email));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let user = match self.user_repo.create(&User::new(name, email.clone(), password_hash)).await {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => return Err(UserServiceError::UserExists(email)),
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = user.id, "User registered");
        let session = self.create_session(user.id).await?;
        Ok((user, session))
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(&input.email))
            .await
            .context("Failed to get user by email")?
            .ok_or_else(|| UserServiceError::AuthenticationError("Failed Login!".to_string()))?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(UserServiceError::AuthenticationError("Failed Login!".to_string()));
        }

        self.create_session(user.id).await
    }

    /// Invalidate a session
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// User behind a session token, or `None` for unknown or expired
    /// sessions. Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        Ok(self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Change a user's name and email
    pub async fn update_account(
        &self,
        user_id: i64,
        name: &str,
        email: &str,
    ) -> Result<User, UserServiceError> {
        let mut errors = Vec::new();
        let name = name.trim();
        if name.is_empty() {
            errors.push(MSG_NAME_REQUIRED.to_string());
        }
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            errors.push(MSG_EMAIL_INVALID.to_string());
        }
        if !errors.is_empty() {
            return Err(UserServiceError::ValidationError(errors));
        }

        match self.user_repo.update_profile(user_id, name, &email).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(UserServiceError::AccountNotFound),
            Err(e) if is_unique_violation(&e) => Err(UserServiceError::UserExists(email)),
            Err(e) => Err(e.context("Failed to update account").into()),
        }
    }

    /// Issue a reset token for `email` and mail the reset link.
    ///
    /// `base_url` is the site origin the link is built on, without a
    /// trailing slash.
    pub async fn forgot_password(&self, email: &str, base_url: &str) -> Result<(), UserServiceError> {
        let user = self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await
            .context("Failed to get user by email")?
            .ok_or(UserServiceError::AccountNotFound)?;

        let token = generate_reset_token();
        let expires = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
        self.user_repo
            .set_reset_token(user.id, &token, expires)
            .await
            .context("Failed to store reset token")?;

        let link = format!("{}/account/reset/{}", base_url.trim_end_matches('/'), token);
        self.mailer
            .send(Mail {
                to: user.email.clone(),
                subject: "Password Reset".to_string(),
                body: format!(
                    "Hello {},\n\nYou have requested a password reset. Follow this link within the next hour to choose a new password:\n\n{}\n\nIf you did not request this, you can ignore this email.\n",
                    user.name, link
                ),
            })
            .await
            .context("Failed to send reset email")?;

        tracing::info!(user_id = user.id, "Password reset token issued");
        Ok(())
    }

    /// User holding a live reset `token`
    pub async fn validate_reset_token(&self, token: &str) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_valid_reset_token(token, Utc::now())
            .await
            .context("Failed to look up reset token")?
            .ok_or(UserServiceError::InvalidOrExpiredToken)
    }

    /// Set a new password with a reset token and log the user in.
    ///
    /// The token is consumed in the same statement that writes the new
    /// hash, so it can be used once. Sessions opened before the reset
    /// are ended.
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<(User, Session), UserServiceError> {
        if password != password_confirm {
            return Err(UserServiceError::PasswordMismatch);
        }
        if password.is_empty() {
            return Err(UserServiceError::ValidationError(vec![MSG_PASSWORD_BLANK.to_string()]));
        }

        let user = self.validate_reset_token(token).await?;
        let password_hash = hash_password(password).context("Failed to hash password")?;

        let consumed = self
            .user_repo
            .consume_reset_token(user.id, token, &password_hash, Utc::now())
            .await
            .context("Failed to reset password")?;
        if !consumed {
            return Err(UserServiceError::InvalidOrExpiredToken);
        }

        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to end sessions")?;

        tracing::info!(user_id = user.id, "Password reset");
        let session = self.create_session(user.id).await?;
        Ok((user, session))
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    /// Create a new session for a user
    pub async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

impl RegisterInput {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        password_confirm: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            password_confirm: password_confirm.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Returns the trimmed name and normalized email
fn validate_register_input(input: &RegisterInput) -> Result<(String, String), UserServiceError> {
    let mut errors = Vec::new();

    let name = input.name.trim().to_string();
    if name.is_empty() {
        errors.push(MSG_NAME_REQUIRED.to_string());
    }
    let email = normalize_email(&input.email);
    if !is_valid_email(&email) {
        errors.push(MSG_EMAIL_INVALID.to_string());
    }
    if input.password.is_empty() {
        errors.push(MSG_PASSWORD_BLANK.to_string());
    }
    if input.password_confirm.is_empty() {
        errors.push(MSG_CONFIRM_BLANK.to_string());
    }
    if input.password != input.password_confirm {
        errors.push(MSG_PASSWORDS_DIFFER.to_string());
    }

    if errors.is_empty() {
        Ok((name, email))
    } else {
        Err(UserServiceError::ValidationError(errors))
    }
}

/// Emails are compared case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `local@domain.tld` with no whitespace
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::services::email::MemoryMailer;

    async fn setup_test_service() -> (DynDatabasePool, UserService, Arc<MemoryMailer>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let mailer = Arc::new(MemoryMailer::default());
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            mailer.clone(),
        );
        (pool, service, mailer)
    }

    async fn register_wes(service: &UserService) -> User {
        let input = RegisterInput::new("Wes", "Wes@Example.com", "pw123456", "pw123456");
        service.register(input).await.expect("Failed to register").0
    }

    fn token_from(mail: &Mail) -> String {
        mail.body
            .split("/account/reset/")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .expect("reset link in mail")
            .to_string()
    }

    // ========================================================================
    // Registration and login
    // ========================================================================

    #[tokio::test]
    async fn test_register_logs_in() {
        let (_pool, service, _mailer) = setup_test_service().await;
        let input = RegisterInput::new("Wes", "Wes@Example.com", "pw123456", "pw123456");
        let (user, session) = service.register(input).await.expect("Failed to register");

        assert_eq!(user.email, "wes@example.com");
        assert_eq!(session.user_id, user.id);

        let current = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(current.id, user.id);
    }

    #[tokio::test]
    async fn test_register_validation_messages() {
        let (_pool, service, _mailer) = setup_test_service().await;
        let result = service.register(RegisterInput::new(" ", "nope", "", "x")).await;

        match result {
            Err(UserServiceError::ValidationError(messages)) => assert_eq!(
                messages,
                vec![MSG_NAME_REQUIRED, MSG_EMAIL_INVALID, MSG_PASSWORD_BLANK, MSG_PASSWORDS_DIFFER]
            ),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_email_fails() {
        let (_pool, service, _mailer) = setup_test_service().await;
        register_wes(&service).await;

        let again = RegisterInput::new("Other", "wes@example.com", "pw", "pw");
        assert!(matches!(
            service.register(again).await,
            Err(UserServiceError::UserExists(_))
        ));
    }

    #[tokio::test]
    async fn test_login() {
        let (_pool, service, _mailer) = setup_test_service().await;
        let user = register_wes(&service).await;

        let session = service
            .login(LoginInput::new("WES@example.com ", "pw123456"))
            .await
            .expect("Failed to login");
        assert_eq!(session.user_id, user.id);

        assert!(matches!(
            service.login(LoginInput::new("wes@example.com", "wrong")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login(LoginInput::new("ghost@example.com", "pw123456")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service, _mailer) = setup_test_service().await;
        register_wes(&service).await;
        let session = service
            .login(LoginInput::new("wes@example.com", "pw123456"))
            .await
            .unwrap();

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let (pool, service, _mailer) = setup_test_service().await;
        let user = register_wes(&service).await;
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            Arc::new(MemoryMailer::default()),
        )
        .with_session_expiration(-1);

        let session = service.create_session(user.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_account() {
        let (_pool, service, _mailer) = setup_test_service().await;
        let user = register_wes(&service).await;
        let other = service
            .register(RegisterInput::new("Other", "other@example.com", "pw", "pw"))
            .await
            .unwrap()
            .0;

        let updated = service
            .update_account(user.id, "Wesley", "wesley@example.com")
            .await
            .unwrap();
        assert_eq!(updated.name, "Wesley");

        assert!(matches!(
            service.update_account(other.id, "Other", "wesley@example.com").await,
            Err(UserServiceError::UserExists(_))
        ));
        assert!(matches!(
            service.update_account(user.id, "", "bad").await,
            Err(UserServiceError::ValidationError(m)) if m.len() == 2
        ));
    }

    // ========================================================================
    // Password reset
    // ========================================================================

    #[tokio::test]
    async fn test_forgot_unknown_account() {
        let (_pool, service, mailer) = setup_test_service().await;
        assert!(matches!(
            service.forgot_password("ghost@example.com", "http://localhost").await,
            Err(UserServiceError::AccountNotFound)
        ));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_password_flow() {
        let (_pool, service, mailer) = setup_test_service().await;
        let user = register_wes(&service).await;
        let old_session = service
            .login(LoginInput::new("wes@example.com", "pw123456"))
            .await
            .expect("Failed to login");

        service
            .forgot_password("wes@example.com", "http://localhost:7777/")
            .await
            .expect("Failed to request reset");

        let mail = mailer.sent.lock().unwrap()[0].clone();
        assert_eq!(mail.to, "wes@example.com");
        assert!(mail.body.contains("http://localhost:7777/account/reset/"));
        let token = token_from(&mail);
        assert_eq!(token.len(), 40);

        assert_eq!(service.validate_reset_token(&token).await.unwrap().id, user.id);

        assert!(matches!(
            service.reset_password(&token, "new-pass", "other-pass").await,
            Err(UserServiceError::PasswordMismatch)
        ));

        let (reset_user, session) = service
            .reset_password(&token, "new-pass", "new-pass")
            .await
            .expect("Failed to reset");
        assert_eq!(reset_user.id, user.id);
        assert_eq!(session.user_id, user.id);

        // Only the session handed out by the reset survives
        assert!(service.validate_session(&old_session.id).await.unwrap().is_none());
        assert!(service.validate_session(&session.id).await.unwrap().is_some());

        // old password gone, new one works, token spent
        assert!(service
            .login(LoginInput::new("wes@example.com", "pw123456"))
            .await
            .is_err());
        assert!(service
            .login(LoginInput::new("wes@example.com", "new-pass"))
            .await
            .is_ok());
        assert!(matches!(
            service.reset_password(&token, "again", "again").await,
            Err(UserServiceError::InvalidOrExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_expired_reset_token() {
        let (pool, service, _mailer) = setup_test_service().await;
        let user = register_wes(&service).await;

        SqlxUserRepository::new(pool)
            .set_reset_token(user.id, "stale", Utc::now() - Duration::minutes(61))
            .await
            .unwrap();

        assert!(matches!(
            service.validate_reset_token("stale").await,
            Err(UserServiceError::InvalidOrExpiredToken)
        ));
        assert!(matches!(
            service.reset_password("stale", "pw", "pw").await,
            Err(UserServiceError::InvalidOrExpiredToken)
        ));
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("wes@example.com"));
        assert!(!is_valid_email("wes@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("wes@@example.com"));
        assert!(!is_valid_email("w es@example.com"));
        assert!(!is_valid_email("wes@.com"));
    }
}
