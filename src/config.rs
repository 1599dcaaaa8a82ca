//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub content: ContentConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 5000)
    pub port: u16,
    /// Public domain (e.g., "learn.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://learn.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Session and password configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign session cookies (32+ bytes)
    pub session_secret: String,
    /// Server-side session lifetime in seconds (default: 86400 = 24h)
    pub session_max_age: i64,
    /// Name of the session cookie
    pub cookie_name: String,
    /// bcrypt cost factor for new password hashes (default: 10)
    pub bcrypt_cost: u32,
    /// How often expired sessions are removed, in seconds (default: 900)
    pub session_prune_interval_seconds: u64,
}

/// Upstream content API (GitHub contents endpoint)
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    /// API root (default: "https://api.github.com")
    pub api_url: String,
    /// Repository owner holding the course material
    pub owner: String,
    /// Repository name holding the course material
    pub repo: String,
    /// Branch, tag or commit to read from (repository default when unset)
    pub git_ref: Option<String>,
    /// Personal access token; anonymous requests when unset
    pub token: Option<String>,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
}

/// Single-page client build served as the fallback route
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClientConfig {
    /// Directory containing `index.html` and static assets
    pub build_dir: Option<PathBuf>,
}

/// Teacher account provisioned at startup
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BootstrapConfig {
    pub teacher_email: Option<String>,
    pub teacher_password: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!("coursegate={},tower_http=debug", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (COURSEGATE__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/coursegate.db")?
            .set_default("auth.session_max_age", 86400)?
            .set_default("auth.cookie_name", "coursegate.sid")?
            .set_default("auth.bcrypt_cost", 10)?
            .set_default("auth.session_prune_interval_seconds", 900)?
            .set_default("content.api_url", "https://api.github.com")?
            .set_default("content.timeout_seconds", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (COURSEGATE__*)
            .add_source(
                Environment::with_prefix("COURSEGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::auth::password::{MAX_COST, MIN_COST};
        use crate::error::AppError;

        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if !(MIN_COST..=MAX_COST).contains(&self.auth.bcrypt_cost) {
            return Err(AppError::Config(format!(
                "auth.bcrypt_cost must be between {} and {}",
                MIN_COST, MAX_COST
            )));
        }

        if self.auth.cookie_name.trim().is_empty() {
            return Err(AppError::Config(
                "auth.cookie_name must not be empty".to_string(),
            ));
        }

        if self.content.owner.trim().is_empty() || self.content.repo.trim().is_empty() {
            return Err(AppError::Config(
                "content.owner and content.repo are required".to_string(),
            ));
        }

        url::Url::parse(&self.content.api_url)
            .map_err(|e| AppError::Config(format!("content.api_url is not a valid URL: {e}")))?;

        match (
            &self.bootstrap.teacher_email,
            &self.bootstrap.teacher_password,
        ) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(AppError::Config(
                    "bootstrap.teacher_email and bootstrap.teacher_password must be set together"
                        .to_string(),
                ));
            }
            _ => {}
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(AppError::Config(format!(
                "logging.level must be one of trace, debug, info, warn, error (got {:?})",
                self.logging.level
            )));
        }

        if !["pretty", "json"]
            .iter()
            .any(|format| self.logging.format.eq_ignore_ascii_case(format))
        {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\" (got {:?})",
                self.logging.format
            )));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/coursegate-test.db"),
            },
            auth: AuthConfig {
                session_secret: "x".repeat(32),
                session_max_age: 86_400,
                cookie_name: "coursegate.sid".to_string(),
                bcrypt_cost: 4,
                session_prune_interval_seconds: 900,
            },
            content: ContentConfig {
                api_url: "https://api.github.com".to_string(),
                owner: "acme".to_string(),
                repo: "curriculum".to_string(),
                git_ref: None,
                token: None,
                timeout_seconds: 30,
            },
            client: ClientConfig::default(),
            bootstrap: BootstrapConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert!(!config.should_use_secure_cookies());
    }

    #[test]
    fn validate_rejects_short_session_secret() {
        let mut config = valid_config();
        config.auth.session_secret = "short-secret".to_string();

        let error = config
            .validate()
            .expect_err("session secret shorter than 32 bytes must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("auth.session_secret")
        ));
    }

    #[test]
    fn validate_rejects_http_for_non_local_domain() {
        let mut config = valid_config();
        config.server.domain = "learn.example.com".to_string();
        config.server.protocol = "http".to_string();

        let error = config
            .validate()
            .expect_err("public domains must require https");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("server.protocol must be https")
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_bcrypt_cost() {
        let mut config = valid_config();
        config.auth.bcrypt_cost = 2;

        let error = config.validate().expect_err("cost below minimum must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("auth.bcrypt_cost")
        ));
    }

    #[test]
    fn validate_rejects_half_configured_bootstrap_teacher() {
        let mut config = valid_config();
        config.bootstrap.teacher_email = Some("teacher@example.com".to_string());

        let error = config
            .validate()
            .expect_err("email without password must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("bootstrap")
        ));
    }

    #[test]
    fn https_domains_use_secure_cookies() {
        let mut config = valid_config();
        config.server.domain = "learn.example.com".to_string();
        config.server.protocol = "https".to_string();

        assert!(config.validate().is_ok());
        assert!(config.should_use_secure_cookies());
    }

    #[test]
    fn logging_section_drives_subscriber_settings() {
        let mut config = valid_config();
        config.logging.level = "debug".to_string();
        config.logging.format = "JSON".to_string();

        assert!(config.validate().is_ok());
        assert!(config.logging.is_json());
        assert_eq!(
            config.logging.default_filter(),
            "coursegate=debug,tower_http=debug"
        );
    }

    #[test]
    fn validate_rejects_unknown_logging_settings() {
        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }
}
