use std::path::PathBuf;

use rmp_serde::{
    decode::Error as MessagePackDecodeError, encode::Error as MessagePackEncodeError,
};
use thiserror::Error;

pub type PersistResult<T> = Result<T, PersistError>;
pub type EncodeResult<T> = Result<T, EncodeError>;
pub type DecodeResult<T> = Result<T, DecodeError>;
pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("field `{field}` is not serializable: {reason}")]
    UnserializableField { field: String, reason: String },
    #[error("Invalid persistence options: {0}")]
    InvalidOptions(String),
    #[error("Malformed result: {0}")]
    MalformedResult(String),
    #[error("Serialized artifact too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge { size: u64, max: u64 },
    #[error("MessagePack encode error: {0}")]
    Serialize(#[from] MessagePackEncodeError),
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl EncodeError {
    pub fn unserializable(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EncodeError::UnserializableField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        EncodeError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Where in the artifact decoding gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Header,
    Body,
    Checksum,
    Decompress,
    Structure,
}

impl DecodeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Body => "body",
            Self::Checksum => "checksum",
            Self::Decompress => "decompress",
            Self::Structure => "structure",
        }
    }
}

impl std::fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Corrupt result stream ({stage}): {reason}")]
    CorruptStream { stage: DecodeStage, reason: String },
    #[error("Artifact does not hold an optimization result: {reason}")]
    SchemaMismatch { reason: String },
    #[error("Unsupported artifact format version: {version}")]
    UnsupportedVersion { version: u8 },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl DecodeError {
    pub fn corrupt(stage: DecodeStage, reason: impl Into<String>) -> Self {
        DecodeError::CorruptStream {
            stage,
            reason: reason.into(),
        }
    }

    pub fn schema(reason: impl Into<String>) -> Self {
        DecodeError::SchemaMismatch {
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        DecodeError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, DecodeError::CorruptStream { .. })
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, DecodeError::SchemaMismatch { .. })
    }
}

impl From<MessagePackDecodeError> for DecodeError {
    fn from(error: MessagePackDecodeError) -> Self {
        match error {
            MessagePackDecodeError::InvalidMarkerRead(e) | MessagePackDecodeError::InvalidDataRead(e) => {
                DecodeError::corrupt(DecodeStage::Structure, e.to_string())
            }
            MessagePackDecodeError::Utf8Error(e) => {
                DecodeError::corrupt(DecodeStage::Structure, e.to_string())
            }
            MessagePackDecodeError::DepthLimitExceeded => {
                DecodeError::corrupt(DecodeStage::Structure, "nesting depth limit exceeded")
            }
            other => DecodeError::schema(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No objective factory registered for kind `{kind}`")]
    UnknownKind { kind: String },
    #[error("Objective factory `{kind}` rejected the payload: {reason}")]
    Rejected { kind: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid result name: {name:?}")]
    InvalidName { name: String },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("No readable backup for {name} in {dir}")]
    NoBackup { name: String, dir: PathBuf },
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            context: context.into(),
            source,
        }
    }
}
