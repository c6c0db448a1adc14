use cos_types::{ReadPreference, WriteConcern, DEFAULT_CHUNK_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Largest accepted chunk size. A chunk plus its envelope must fit in one
/// 16 MiB backend document.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024 - 16 * 1024;

/// Write concern as it appears in configuration: either a structured value
/// or the legacy boolean `safe` flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteConcernSetting {
    Safe(bool),
    Concern(WriteConcern),
}

impl WriteConcernSetting {
    /// Collapse the setting into a structured write concern.
    pub fn resolve(&self) -> WriteConcern {
        match self {
            Self::Safe(safe) => WriteConcern::from_legacy_safe(*safe),
            Self::Concern(concern) => *concern,
        }
    }
}

impl Default for WriteConcernSetting {
    fn default() -> Self {
        Self::Concern(WriteConcern::ACKNOWLEDGED)
    }
}

/// Store configuration, immutable once the store is opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Collections are named `<prefix>.files` and `<prefix>.chunks`.
    pub collection_prefix: String,
    /// Chunk size for writes that do not override it.
    pub chunk_size_bytes: usize,
    pub read_preference: ReadPreference,
    /// Accepts the legacy key `safe` with a boolean value.
    #[serde(alias = "safe")]
    pub write_concern: WriteConcernSetting,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            collection_prefix: "fs".into(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            read_preference: ReadPreference::Primary,
            write_concern: WriteConcernSetting::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration under a custom collection prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            collection_prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| StoreError::InvalidArgument(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_chunk_size(mut self, chunk_size_bytes: usize) -> Self {
        self.chunk_size_bytes = chunk_size_bytes;
        self
    }

    pub fn with_read_preference(mut self, read_preference: ReadPreference) -> Self {
        self.read_preference = read_preference;
        self
    }

    pub fn with_write_concern(mut self, concern: WriteConcern) -> Self {
        self.write_concern = WriteConcernSetting::Concern(concern);
        self
    }

    /// Set the write concern from the legacy boolean `safe` flag.
    pub fn with_safe(mut self, safe: bool) -> Self {
        self.write_concern = WriteConcernSetting::Safe(safe);
        self
    }

    /// The configured write concern in structured form.
    pub fn write_concern(&self) -> WriteConcern {
        self.write_concern.resolve()
    }

    pub fn files_collection(&self) -> String {
        format!("{}.files", self.collection_prefix)
    }

    pub fn chunks_collection(&self) -> String {
        format!("{}.chunks", self.collection_prefix)
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> StoreResult<()> {
        if self.collection_prefix.is_empty() {
            return Err(StoreError::InvalidArgument(
                "collection prefix must not be empty".into(),
            ));
        }
        if self.collection_prefix.contains('$') || self.collection_prefix.contains('\0') {
            return Err(StoreError::InvalidArgument(format!(
                "collection prefix {:?} contains a forbidden character",
                self.collection_prefix
            )));
        }
        validate_chunk_size(self.chunk_size_bytes)
    }
}

/// Reject chunk sizes the store cannot write.
pub fn validate_chunk_size(chunk_size: usize) -> StoreResult<()> {
    if chunk_size == 0 {
        return Err(StoreError::InvalidArgument(
            "chunk size must be greater than zero".into(),
        ));
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(StoreError::InvalidArgument(format!(
            "chunk size {chunk_size} exceeds maximum {MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}
