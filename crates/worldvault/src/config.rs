//! # Store Configuration
//!
//! Tunables for a [`WorldStore`](crate::provider::WorldStore), loadable
//! from TOML. Every field has a default, so an empty document is valid.
//!
//! ```toml
//! create_if_missing = true
//! sync_writes = true
//! compression_level = 9
//! node_cache_capacity = 4096
//! ```

use std::num::NonZeroUsize;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Highest zlib compression level.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// World store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Create an empty world file when `open()` finds none.
    pub create_if_missing: bool,
    /// Sync to disk at every ordering barrier, not just on close.
    pub sync_writes: bool,
    /// zlib level for chunk payloads (0 = store, 9 = best).
    pub compression_level: u32,
    /// Directory pages kept in the lookup cache.
    pub node_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_writes: true,
            compression_level: MAX_COMPRESSION_LEVEL,
            node_cache_capacity: 4096,
        }
    }
}

impl StoreConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] on syntax errors, unknown keys or invalid values.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file cannot be read, otherwise as
    /// [`StoreConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`StoreError::Config`] describing the first invalid field.
    pub fn validate(&self) -> StoreResult<()> {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(StoreError::Config(format!(
                "compression_level {} is above {MAX_COMPRESSION_LEVEL}",
                self.compression_level
            )));
        }
        if self.node_cache_capacity == 0 {
            return Err(StoreError::Config("node_cache_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Cache capacity as the type the LRU wants.
    #[must_use]
    pub fn cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.node_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
