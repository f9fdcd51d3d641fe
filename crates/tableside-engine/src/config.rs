//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TABLESIDE_PORT=8080                                                │
//! │     TABLESIDE_JWT_SECRET=...                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path>, or TABLESIDE_CONFIG, or                           │
//! │     ~/.config/tableside/tableside.toml (Linux)                         │
//! │     ~/Library/Application Support/com.tableside.tableside/ (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//! request_timeout_secs = 15
//!
//! [database]
//! path = "/var/lib/tableside/tableside.db"
//! max_connections = 8
//!
//! [otp]
//! validity_secs = 59
//! code_length = 6
//! max_attempts = 3
//!
//! [cart]
//! max_cart_items = 100
//! max_item_quantity = 99
//!
//! [auth]
//! jwt_secret = "..."
//!
//! [feed]
//! capacity = 256
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use tableside_core::otp::{OtpPolicy, DEFAULT_OTP_CODE_LENGTH};
use tableside_core::{
    DEFAULT_OTP_MAX_ATTEMPTS, DEFAULT_OTP_VALIDITY_SECS, MAX_CART_ITEMS, MAX_ITEM_QUANTITY,
};
use tableside_db::DbConfig;

use crate::error::{EngineError, EngineResult};

/// Value of `database.path` that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Requests running longer than this are answered with a timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    15
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Unset means the platform data directory;
    /// `":memory:"` means a throwaway in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpSettings {
    #[serde(default = "default_otp_validity")]
    pub validity_secs: i64,

    #[serde(default = "default_code_length")]
    pub code_length: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_otp_validity() -> i64 {
    DEFAULT_OTP_VALIDITY_SECS
}

fn default_code_length() -> usize {
    DEFAULT_OTP_CODE_LENGTH
}

fn default_max_attempts() -> u32 {
    DEFAULT_OTP_MAX_ATTEMPTS
}

impl Default for OtpSettings {
    fn default() -> Self {
        OtpSettings {
            validity_secs: default_otp_validity(),
            code_length: default_code_length(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSettings {
    #[serde(default = "default_max_cart_items")]
    pub max_cart_items: usize,

    #[serde(default = "default_max_item_quantity")]
    pub max_item_quantity: i64,
}

fn default_max_cart_items() -> usize {
    MAX_CART_ITEMS
}

fn default_max_item_quantity() -> i64 {
    MAX_ITEM_QUANTITY
}

impl Default for CartSettings {
    fn default() -> Self {
        CartSettings {
            max_cart_items: default_max_cart_items(),
            max_item_quantity: default_max_item_quantity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the service that issues staff tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
}

fn default_jwt_secret() -> String {
    // Development only; production sets TABLESIDE_JWT_SECRET
    "tableside-dev-secret-change-in-production".to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            jwt_secret: default_jwt_secret(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Events buffered per subscriber before a slow one starts skipping.
    #[serde(default = "default_feed_capacity")]
    pub capacity: usize,
}

fn default_feed_capacity() -> usize {
    256
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            capacity: default_feed_capacity(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub otp: OtpSettings,

    #[serde(default)]
    pub cart: CartSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub feed: FeedSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else `TABLESIDE_CONFIG`, else the platform path)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var("TABLESIDE_CONFIG").ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document (no environment overrides).
    pub fn from_toml(contents: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// A config for tests: in-memory database, defaults elsewhere.
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.database.path = Some(PathBuf::from(IN_MEMORY_PATH));
        config
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.otp.validity_secs <= 0 {
            return Err(EngineError::Config(
                "otp.validity_secs must be greater than 0".into(),
            ));
        }
        if !(4..=10).contains(&self.otp.code_length) {
            return Err(EngineError::Config(
                "otp.code_length must be between 4 and 10".into(),
            ));
        }
        if self.otp.max_attempts == 0 {
            return Err(EngineError::Config(
                "otp.max_attempts must be greater than 0".into(),
            ));
        }
        if self.cart.max_cart_items == 0 || self.cart.max_item_quantity <= 0 {
            return Err(EngineError::Config("cart limits must be greater than 0".into()));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(EngineError::Config("auth.jwt_secret must not be empty".into()));
        }
        if self.feed.capacity == 0 {
            return Err(EngineError::Config("feed.capacity must be greater than 0".into()));
        }
        if self.database.max_connections == 0 {
            return Err(EngineError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(EngineError::Config(
                "server.request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TABLESIDE_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Ok(port) = std::env::var("TABLESIDE_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(port = %port, "Ignoring invalid TABLESIDE_PORT"),
            }
        }

        if let Ok(path) = std::env::var("TABLESIDE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("TABLESIDE_OTP_VALIDITY_SECS") {
            if let Ok(s) = secs.parse::<i64>() {
                self.otp.validity_secs = s;
            }
        }

        if let Ok(secret) = std::env::var("TABLESIDE_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tableside", "tableside")
            .map(|dirs| dirs.config_dir().join("tableside.toml"))
    }

    fn default_database_path() -> PathBuf {
        directories::ProjectDirs::from("com", "tableside", "tableside")
            .map(|dirs| dirs.data_dir().join("tableside.db"))
            .unwrap_or_else(|| PathBuf::from("tableside.db"))
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    pub fn otp_policy(&self) -> OtpPolicy {
        OtpPolicy {
            validity: chrono::Duration::seconds(self.otp.validity_secs),
            code_length: self.otp.code_length,
            max_attempts: self.otp.max_attempts,
        }
    }

    pub fn db_config(&self) -> DbConfig {
        match &self.database.path {
            Some(path) if path.as_os_str() == IN_MEMORY_PATH => DbConfig::in_memory(),
            Some(path) => DbConfig::new(path).max_connections(self.database.max_connections),
            None => DbConfig::new(Self::default_database_path())
                .max_connections(self.database.max_connections),
        }
    }
}
