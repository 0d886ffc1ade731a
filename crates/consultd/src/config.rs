//! Configuration System
//!
//! Loads daemon configuration from a TOML file with environment variable
//! overrides. Every section has defaults, so an empty file (or no file at
//! all) yields a working configuration.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8090"
//!
//! [chat]
//! outbound_capacity = 64
//! idle_timeout_secs = 300
//!
//! [[sessions]]
//! id = 42
//! doctor_id = 1
//! patient_id = 2
//!
//! [[profiles]]
//! user_id = 1
//! name = "Dr. Grey"
//! ```

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use consult_core::{SessionId, SessionStatus, UserId};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CONSULT_CONFIG";

/// Environment override for `server.bind`.
pub const BIND_ENV: &str = "CONSULT_BIND";

/// Environment override for `logging.json`.
pub const LOG_JSON_ENV: &str = "CONSULT_LOG_JSON";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Sessions preloaded into the in-memory session store
    #[serde(default)]
    pub sessions: Vec<SeedSession>,

    /// Profiles preloaded into the in-memory profile resolver
    #[serde(default)]
    pub profiles: Vec<SeedProfile>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:8090".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Chat core tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Capacity of each client's outbound queue; a full queue evicts the client
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Capacity of the hub's command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// A connection silent for this long is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    /// Largest inbound frame accepted
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_outbound_capacity() -> usize {
    64
}

fn default_command_buffer() -> usize {
    crate::hub::DEFAULT_COMMAND_BUFFER
}

fn default_idle_timeout() -> u64 {
    300 // 5 minutes
}

fn default_write_timeout() -> u64 {
    10
}

fn default_heartbeat() -> u64 {
    30
}

fn default_max_frame_bytes() -> usize {
    64 * 1024 // 64 KB
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: default_outbound_capacity(),
            command_buffer: default_command_buffer(),
            idle_timeout_secs: default_idle_timeout(),
            write_timeout_secs: default_write_timeout(),
            heartbeat_secs: default_heartbeat(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ChatConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directives when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "consultd=info,consult=info,tower_http=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

/// A session preloaded into the in-memory store.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedSession {
    pub id: SessionId,
    pub doctor_id: UserId,
    pub patient_id: UserId,
    #[serde(default = "default_seed_status")]
    pub status: SessionStatus,
}

fn default_seed_status() -> SessionStatus {
    SessionStatus::Ongoing
}

/// A profile preloaded into the in-memory resolver.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedProfile {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl Config {
    /// Parses configuration from TOML text and validates it.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or from the default location when
    /// `path` is `None`, then applies environment overrides.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = env::var(BIND_ENV) {
            self.server.bind = bind;
        }
        if let Ok(json) = env::var(LOG_JSON_ENV) {
            self.logging.json = matches!(json.trim(), "1" | "true" | "yes");
        }
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        let chat = &self.chat;
        if chat.outbound_capacity == 0 {
            return Err(ConfigError::Invalid("chat.outbound_capacity must be > 0".to_string()));
        }
        if chat.command_buffer == 0 {
            return Err(ConfigError::Invalid("chat.command_buffer must be > 0".to_string()));
        }
        if chat.heartbeat_secs == 0 || chat.write_timeout_secs == 0 || chat.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid("chat timeouts must be > 0".to_string()));
        }
        if chat.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("chat.max_frame_bytes must be > 0".to_string()));
        }

        for session in &self.sessions {
            if session.doctor_id == session.patient_id {
                return Err(ConfigError::Invalid(format!(
                    "session {} has the same doctor and patient",
                    session.id
                )));
            }
        }

        Ok(())
    }

    /// Parsed `server.bind`.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server.bind {:?}: {e}", self.server.bind)))
    }
}

/// `$CONSULT_CONFIG`, else `<config dir>/consult/consultd.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("consult").join("consultd.toml"))
}
