//! Module: config
//! Responsibility: repository-wide defaults loaded from TOML.
//! Does not own: per-statement overrides (those live on `BulkMutation`).
//! Boundary: parsed once by the caller and handed to `Repository::new`.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error as ThisError;

/// Upper bound applied to caller page sizes unless configured otherwise.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 2000;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

///
/// RepositoryConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Emit `[debug]` diagnostic lines from the executors.
    pub debug: bool,
    pub paging: PagingConfig,
    pub bulk: BulkConfig,
}

impl RepositoryConfig {
    /// Parse and validate config text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.paging.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "paging.max_page_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

///
/// PagingConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagingConfig {
    /// Larger requested page sizes are clamped to this value.
    pub max_page_size: u32,

    /// Accept 1-based page numbers when parsing external page requests.
    pub one_indexed: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            one_indexed: false,
        }
    }
}

///
/// BulkConfig
///
/// Repository defaults for bulk statements; each statement may override them.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkConfig {
    pub clear_automatically: bool,
    pub flush_automatically: bool,
}

///
/// TESTS
///
