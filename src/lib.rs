//! Optimization result persistence
//!
//! Turns the outcome of a black-box optimization run into a durable artifact
//! and back:
//! - selective persistence of the objective callable, copying only the run
//!   specification when it has to be dropped
//! - raw or gzip-compressed bodies behind a self-describing header
//! - atomic write-then-rename to files, checksummed reads
//! - checkpointing during a run and an async archive with backups
//!
//! Decoded callables are opaque bytes. Resolving them through an
//! `ObjectiveRegistry` is only safe for artifacts from a trusted source.

pub mod result; // 结果数据模型
pub mod storage; // 存储编解码
pub mod utils; // 工具模块

pub use result::{
    ObjectiveCallable, ObjectiveRegistry, OpaqueCallable, OptimizeResult, ParamValue,
    RunSpecification, SpecValue, CALLABLE_KEY,
};
pub use storage::{
    decode, dump, encode, load, DecodeError, DecodeOptions, Destination, EncodeError,
    PersistError, PersistenceOptions, ResultDecoder, ResultEncoder, Source,
    TrustBoundaryWarning,
};
