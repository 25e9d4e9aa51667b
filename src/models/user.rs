//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Login email (unique)
    pub email: String,
    /// Argon2 password hash
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Pending password-reset token
    #[serde(skip)]
    pub reset_token: Option<String>,
    /// When the pending reset token stops being accepted
    #[serde(skip)]
    pub reset_expires: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user.
    ///
    /// The ID will be set to 0 and should be assigned by the database.
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            email,
            password_hash,
            reset_token: None,
            reset_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `token` is this user's reset token and is still live at `now`
    pub fn reset_token_matches(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.reset_token, self.reset_expires) {
            (Some(stored), Some(expires)) => stored == token && expires > now,
            _ => false,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Public projection of a user, safe to render next to their content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

/// The set of stores a user has hearted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserHearts {
    pub user_id: i64,
    /// Hearted store IDs, oldest heart first
    pub hearts: Vec<i64>,
}

impl UserHearts {
    pub fn contains(&self, store_id: i64) -> bool {
        self.hearts.contains(&store_id)
    }
}
