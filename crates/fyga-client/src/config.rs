//! Client configuration.
//!
//! Read from a TOML file; every key is optional:
//!
//! ```toml
//! [store]
//! max_transaction_attempts = 5
//!
//! [feed]
//! event_capacity = 256
//!
//! [profile]
//! min_username_len = 3
//! anonymous_name = "Anonymous"
//! ```

use std::path::{Path, PathBuf};

use fyga_store::{DEFAULT_MAX_TRANSACTION_ATTEMPTS, MemoryStoreConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{DEFAULT_ANONYMOUS_NAME, DEFAULT_EVENT_CAPACITY, DEFAULT_MIN_USERNAME_LEN};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Attempts (including the first) before a conflicting transaction fails.
    pub max_transaction_attempts: u32,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            max_transaction_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSection {
    /// Capacity of the mutation event broadcast channel.
    pub event_capacity: usize,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSection {
    pub min_username_len: usize,
    /// Author name used when posting or commenting without a loaded profile.
    pub anonymous_name: String,
}

impl Default for ProfileSection {
    fn default() -> Self {
        Self {
            min_username_len: DEFAULT_MIN_USERNAME_LEN,
            anonymous_name: DEFAULT_ANONYMOUS_NAME.to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub store: StoreSection,
    pub feed: FeedSection,
    pub profile: ProfileSection,
}

impl ClientConfig {
    /// Load config from disk, or return defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_transaction_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store.max_transaction_attempts must be at least 1".into(),
            ));
        }
        if self.feed.event_capacity == 0 {
            return Err(ConfigError::Invalid("feed.event_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Settings for an in-process store.
    pub fn memory_store(&self) -> MemoryStoreConfig {
        MemoryStoreConfig {
            max_transaction_attempts: self.store.max_transaction_attempts,
        }
    }
}
