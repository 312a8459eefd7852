/*!
 * Persistence options
 *
 * Encoder, decoder and archive settings. All of them deserialize from
 * camelCase JSON so they can sit inside a larger application config.
 */

use serde::{Deserialize, Serialize};

use crate::storage::error::{EncodeError, EncodeResult, PersistResult};

/// Highest accepted compression level
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Default upper bound for a single artifact
pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 512 * 1024 * 1024; // 512MB

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceOptions {
    /// 0 writes raw MessagePack, 1-9 gzip at that level
    pub compression_level: u32,
    /// Keep the objective callable in the stored run specification
    pub include_callable_field: bool,
    pub max_artifact_size: u64,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            compression_level: 0,
            include_callable_field: true,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
        }
    }
}

impl PersistenceOptions {
    pub fn compressed(level: u32) -> Self {
        Self {
            compression_level: level,
            ..Default::default()
        }
    }

    pub fn without_callable() -> Self {
        Self {
            include_callable_field: false,
            ..Default::default()
        }
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_callable_field(mut self, include: bool) -> Self {
        self.include_callable_field = include;
        self
    }

    pub fn from_json(text: &str) -> PersistResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn is_compressed(&self) -> bool {
        self.compression_level > 0
    }

    pub fn validate(&self) -> EncodeResult<()> {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(EncodeError::InvalidOptions(format!(
                "compression level {} is outside 0-{}",
                self.compression_level, MAX_COMPRESSION_LEVEL
            )));
        }
        if self.max_artifact_size == 0 {
            return Err(EncodeError::InvalidOptions(
                "max artifact size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecodeOptions {
    pub verify_checksum: bool,
    /// Declared body lengths above this are treated as corruption
    pub max_artifact_size: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
        }
    }
}

impl DecodeOptions {
    pub fn from_json(text: &str) -> PersistResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
