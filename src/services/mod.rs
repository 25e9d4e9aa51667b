//! Services layer - Business logic
//!
//! Services own validation and the rules that span more than one
//! repository. They are constructed with injected repositories and hold no
//! other shared state.

pub mod email;
pub mod geo;
pub mod heart;
pub mod password;
pub mod review;
pub mod slug;
pub mod store;
pub mod user;

pub use email::{mailer_from_config, LogMailer, Mail, Mailer, SmtpMailer};
pub use heart::{HeartService, HeartServiceError};
pub use password::{generate_reset_token, hash_password, verify_password};
pub use review::{ReviewDraft, ReviewService, ReviewServiceError};
pub use slug::{generate_slug, next_free_slug};
pub use store::{confirm_owner, StoreDraft, StoreService, StoreServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
