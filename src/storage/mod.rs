/*!
 * Result storage
 *
 * Encoder and decoder for optimization-result artifacts, the shared schema
 * and container-format helpers, plus two consumers built on them: a
 * per-iteration checkpoint saver and an async directory archive.
 */

pub mod archive;
pub mod checkpoint;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod options;
pub mod schema;

// 重新导出核心类型和函数
pub use archive::{ArchiveOptions, ArchiveStats, ResultArchive};
pub use checkpoint::CheckpointSaver;
pub use decoder::{decode, load, DecodeReport, ResultDecoder, Source, TrustBoundaryWarning};
pub use encoder::{dump, encode, Destination, ResultEncoder};
pub use error::{
    ArchiveError, DecodeError, DecodeStage, EncodeError, PersistError, PersistResult,
    ResolveError,
};
pub use format::{ArtifactHeader, BodyEncoding, FORMAT_VERSION, SCHEMA_VERSION};
pub use options::{DecodeOptions, PersistenceOptions};
pub use schema::prepare_for_storage;

/// 目录名称
pub const RESULTS_DIR_NAME: &str = "results";
pub const BACKUPS_DIR_NAME: &str = "backups";

/// 文件扩展名
pub const ARTIFACT_EXTENSION: &str = "optr";
pub const BACKUP_EXTENSION: &str = "bak";
