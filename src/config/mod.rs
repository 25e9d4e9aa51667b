//! Configuration management
//!
//! Configuration is read from `config.yml` and may be overridden by
//! `DELICIOUS_*` environment variables. Missing values fall back to defaults,
//! so an absent or empty file yields a runnable configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Template configuration
    #[serde(default)]
    pub views: ViewsConfig,
    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// Outgoing mail configuration
    #[serde(default)]
    pub mail: MailConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL used in emailed links, e.g. `https://stores.example.com`.
    /// When unset the request `Host` header is used.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7777
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/delicious.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewsConfig {
    /// Directory whose `.html` files override the built-in templates
    #[serde(default = "default_views_path")]
    pub path: PathBuf,
    /// Site name shown in page titles and the header
    #[serde(default = "default_site_name")]
    pub site_name: String,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            path: default_views_path(),
            site_name: default_site_name(),
        }
    }
}

fn default_views_path() -> PathBuf {
    PathBuf::from("templates")
}

fn default_site_name() -> String {
    "Now That's Delicious!".to_string()
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload directory path
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed MIME types; `type/*` matches any subtype
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("public/uploads")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_types() -> Vec<String> {
    vec!["image/*".to_string()]
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        self.allowed_types.iter().any(|allowed| {
            match allowed.strip_suffix("/*") {
                Some(top_level) => mime_type
                    .split_once('/')
                    .map_or(false, |(t, sub)| t == top_level && !sub.is_empty()),
                None => *allowed == mime_type,
            }
        })
    }

    /// File extension for a photo MIME type
    ///
    /// Only raster formats are stored. Anything else, svg included, has no
    /// extension and is refused.
    pub fn get_extension(&self, mime_type: &str) -> Option<&'static str> {
        let essence = mime_type.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/gif" => Some("gif"),
            "image/webp" => Some("webp"),
            _ => None,
        }
    }
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host; mail is logged instead of sent when unset
    #[serde(default)]
    pub smtp_host: Option<String>,
    /// SMTP port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username
    #[serde(default)]
    pub username: String,
    /// SMTP password
    #[serde(default)]
    pub password: String,
    /// Sender mailbox
    #[serde(default = "default_mail_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: default_mail_from(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "Delicious <noreply@delicious.local>".to_string()
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Days until a login session expires
    #[serde(default = "default_expiration_days")]
    pub expiration_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiration_days: default_expiration_days(),
        }
    }
}

fn default_expiration_days() -> i64 {
    7
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - DELICIOUS_SERVER_HOST
    /// - DELICIOUS_SERVER_PORT
    /// - DELICIOUS_SERVER_PUBLIC_URL
    /// - DELICIOUS_DATABASE_DRIVER
    /// - DELICIOUS_DATABASE_URL
    /// - DELICIOUS_VIEWS_PATH
    /// - DELICIOUS_UPLOAD_PATH
    /// - DELICIOUS_MAIL_SMTP_HOST
    /// - DELICIOUS_MAIL_USERNAME
    /// - DELICIOUS_MAIL_PASSWORD
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values no deployment can run with
    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.expiration_days <= 0 {
            return Err(ConfigError::ValidationError(
                "session.expiration_days must be positive".to_string(),
            ));
        }
        if self.upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DELICIOUS_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DELICIOUS_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(public_url) = std::env::var("DELICIOUS_SERVER_PUBLIC_URL") {
            self.server.public_url = Some(public_url);
        }

        if let Ok(driver) = std::env::var("DELICIOUS_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("DELICIOUS_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(path) = std::env::var("DELICIOUS_VIEWS_PATH") {
            self.views.path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("DELICIOUS_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }

        if let Ok(host) = std::env::var("DELICIOUS_MAIL_SMTP_HOST") {
            self.mail.smtp_host = Some(host);
        }
        if let Ok(username) = std::env::var("DELICIOUS_MAIL_USERNAME") {
            self.mail.username = username;
        }
        if let Ok(password) = std::env::var("DELICIOUS_MAIL_PASSWORD") {
            self.mail.password = password;
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches DELICIOUS_* variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "[a-z]{1,10}(\\.[a-z]{1,10}){0,2}",
            1024u16..65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "[a-z]{1,10}/[a-z]{1,10}\\.db",
            1i64..365,
            1u64..100_000_000,
        )
            .prop_map(|(host, port, driver, url, days, max_size)| Config {
                server: ServerConfig {
                    host,
                    port,
                    public_url: None,
                },
                database: DatabaseConfig { driver, url },
                views: ViewsConfig::default(),
                upload: UploadConfig {
                    max_file_size: max_size,
                    ..UploadConfig::default()
                },
                mail: MailConfig::default(),
                session: SessionConfig {
                    expiration_days: days,
                },
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing a config to YAML and loading it back keeps every field.
        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).unwrap();
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "{}", yaml).unwrap();

            let loaded = Config::load(file.path()).unwrap();
            prop_assert_eq!(loaded.server.host, config.server.host);
            prop_assert_eq!(loaded.server.port, config.server.port);
            prop_assert_eq!(loaded.database.driver, config.database.driver);
            prop_assert_eq!(loaded.database.url, config.database.url);
            prop_assert_eq!(loaded.session.expiration_days, config.session.expiration_days);
            prop_assert_eq!(loaded.upload.max_file_size, config.upload.max_file_size);
        }

        /// Any valid port in the environment wins over the file.
        #[test]
        fn env_port_takes_precedence(file_port in 1024u16..30000, env_port in 30000u16..65535) {
            let _guard = lock_env();
            let mut file = NamedTempFile::new().unwrap();
            write!(file, "server:\n  port: {}\n", file_port).unwrap();

            std::env::set_var("DELICIOUS_SERVER_PORT", env_port.to_string());
            let config = Config::load_with_env(file.path());
            std::env::remove_var("DELICIOUS_SERVER_PORT");

            prop_assert_eq!(config.unwrap().server.port, env_port);
        }
    }
}
