/*!
 * Result encoder
 *
 * Serializes an `OptimizeResult` to named-field MessagePack, optionally
 * through a gzip stream, frames it with the artifact header and writes it
 * out. Nothing reaches the destination until the whole artifact is built.
 */

use flate2::{write::GzEncoder, Compression};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::result::OptimizeResult;
use crate::storage::error::{EncodeError, EncodeResult};
use crate::storage::format::{ArtifactHeader, BodyEncoding, HEADER_LEN};
use crate::storage::options::PersistenceOptions;
use crate::storage::schema::{check_serializable, prepare_for_storage, validate_for_encode};

/// Where an encoded artifact goes
pub enum Destination<'a> {
    /// Replaced atomically; a failed encode leaves it untouched
    Path(&'a Path),
    Writer(&'a mut dyn Write),
}

impl<'a> Destination<'a> {
    pub fn writer(writer: &'a mut dyn Write) -> Self {
        Destination::Writer(writer)
    }
}

impl<'a> From<&'a Path> for Destination<'a> {
    fn from(path: &'a Path) -> Self {
        Destination::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for Destination<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Destination::Path(path.as_path())
    }
}

#[derive(Debug, Clone)]
pub struct ResultEncoder {
    options: PersistenceOptions,
}

impl ResultEncoder {
    pub fn new(options: PersistenceOptions) -> EncodeResult<Self> {
        options.validate()?;

        debug!(
            "encoder: compression_level={}, include_callable_field={}",
            options.compression_level, options.include_callable_field
        );

        Ok(Self { options })
    }

    pub fn options(&self) -> &PersistenceOptions {
        &self.options
    }

    /// Build the complete artifact in memory.
    pub fn encode_to_vec(&self, result: &OptimizeResult) -> EncodeResult<Vec<u8>> {
        let prepared = prepare_for_storage(result, self.options.include_callable_field);
        check_serializable(&prepared)?;
        validate_for_encode(&prepared)?;

        let (encoding, body) = self.serialize_body(&prepared)?;

        let size = (HEADER_LEN + body.len()) as u64;
        if size > self.options.max_artifact_size {
            return Err(EncodeError::PayloadTooLarge {
                size,
                max: self.options.max_artifact_size,
            });
        }

        let header = ArtifactHeader::for_body(encoding, self.options.compression_level as u8, &body);

        let mut artifact = Vec::with_capacity(size as usize);
        artifact.extend_from_slice(&header.to_bytes());
        artifact.extend_from_slice(&body);

        debug!(
            "artifact ready: {} bytes, encoding={:?}, checksum={}",
            artifact.len(),
            encoding,
            header.checksum_prefix()
        );

        Ok(artifact)
    }

    pub fn encode(&self, result: &OptimizeResult, destination: Destination<'_>) -> EncodeResult<()> {
        let artifact = self.encode_to_vec(result)?;

        match destination {
            Destination::Path(path) => {
                write_atomic(path, &artifact)?;
                info!("result saved: {} ({} bytes)", path.display(), artifact.len());
            }
            Destination::Writer(writer) => {
                writer
                    .write_all(&artifact)
                    .map_err(|e| EncodeError::io("writing artifact to stream", e))?;
                writer
                    .flush()
                    .map_err(|e| EncodeError::io("flushing artifact stream", e))?;
            }
        }

        Ok(())
    }

    pub fn encode_to_path(&self, result: &OptimizeResult, path: impl AsRef<Path>) -> EncodeResult<()> {
        self.encode(result, Destination::Path(path.as_ref()))
    }

    fn serialize_body(&self, result: &OptimizeResult) -> EncodeResult<(BodyEncoding, Vec<u8>)> {
        let mut buf = Vec::new();
        rmp_serde::encode::write_named(&mut buf, result)?;

        if !self.options.is_compressed() {
            debug!("MessagePack body: {} bytes", buf.len());
            return Ok((BodyEncoding::Raw, buf));
        }

        let body = compress(&buf, self.options.compression_level)?;

        debug!(
            "gzip body: {} -> {} bytes (level {}), ratio: {:.2}%",
            buf.len(),
            body.len(),
            self.options.compression_level,
            if buf.is_empty() {
                0.0
            } else {
                (1.0 - body.len() as f64 / buf.len() as f64) * 100.0
            }
        );

        Ok((BodyEncoding::Gzip, body))
    }
}

fn compress(data: &[u8], level: u32) -> EncodeResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| EncodeError::io("compressing body", e))?;
    encoder
        .finish()
        .map_err(|e| EncodeError::io("finishing gzip stream", e))
}

/// Write `data` to a temporary file next to `target` and rename it into
/// place. The temporary file is removed on every failure path.
pub(crate) fn write_atomic(target: &Path, data: &[u8]) -> EncodeResult<()> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| EncodeError::io(format!("creating temporary file in {}", dir.display()), e))?;
    temp.write_all(data)
        .map_err(|e| EncodeError::io(format!("writing temporary file {}", temp.path().display()), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| EncodeError::io("syncing temporary file", e))?;

    temp.persist(target).map_err(|e| {
        EncodeError::io(format!("renaming artifact into {}", target.display()), e.error)
    })?;

    Ok(())
}

/// Encode `result` into `destination` with `options`.
pub fn encode(
    result: &OptimizeResult,
    destination: Destination<'_>,
    options: &PersistenceOptions,
) -> EncodeResult<()> {
    ResultEncoder::new(options.clone())?.encode(result, destination)
}

/// Encode `result` to a file at `path`, replacing any existing artifact.
pub fn dump(
    result: &OptimizeResult,
    path: impl AsRef<Path>,
    options: &PersistenceOptions,
) -> EncodeResult<()> {
    ResultEncoder::new(options.clone())?.encode_to_path(result, path)
}
