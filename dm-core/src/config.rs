//! Game configuration and API credentials.
//!
//! Configuration is read from an optional TOML file; every field has a
//! default so an empty or missing file yields a playable setup.

use crate::conversation::DEFAULT_WINDOW;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Every valid API key starts with this prefix.
pub const CREDENTIAL_PREFIX: &str = "sk-";

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_MAX_TOKENS: usize = 1000;

/// Smallest usable window: the system prompt, one earlier message and the
/// latest player action.
pub const MIN_WINDOW: usize = 3;

/// Errors from configuration and credential handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No API key configured")]
    MissingCredential,

    #[error("Invalid API key (it should start with sk-)")]
    InvalidCredential,

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("window must be at least 3, got {window}")]
    InvalidWindow { window: usize },
}

/// A format-checked API key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Trim and validate a raw key.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        if !key.starts_with(CREDENTIAL_PREFIX) || key.len() == CREDENTIAL_PREFIX.len() {
            return Err(ConfigError::InvalidCredential);
        }
        Ok(Self(key.to_string()))
    }

    /// Read OPENAI_API_KEY, ignoring unset or malformed values.
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var("OPENAI_API_KEY").ok()?;
        match Self::parse(&raw) {
            Ok(credential) => Some(credential),
            Err(e) => {
                log::warn!("Ignoring OPENAI_API_KEY: {e}");
                None
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({CREDENTIAL_PREFIX}***)")
    }
}

/// Tunables for a game session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Chat model name.
    pub model: String,

    /// Alternative API root, e.g. a proxy.
    pub base_url: Option<String>,

    pub temperature: f32,

    /// Output token ceiling per reply.
    pub max_tokens: usize,

    /// Largest conversation sent unwindowed.
    pub window: usize,

    /// HTTP timeout for one API call.
    pub request_timeout_secs: u64,

    /// Upper bound on waiting for any provider during a turn.
    pub turn_timeout_ms: u64,

    pub autosave_interval_secs: u64,

    /// Artificial delay for demo-mode replies.
    pub simulated_latency_ms: u64,

    /// Directory holding the storage slots.
    pub save_dir: PathBuf,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            window: DEFAULT_WINDOW,
            request_timeout_secs: 60,
            turn_timeout_ms: 90_000,
            autosave_interval_secs: 30,
            simulated_latency_ms: 800,
            save_dir: PathBuf::from("saves"),
        }
    }
}

impl GameConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.window < MIN_WINDOW {
            return Err(ConfigError::InvalidWindow {
                window: config.window,
            });
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the window, raised to [`MIN_WINDOW`] if smaller.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(MIN_WINDOW);
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_simulated_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}
