/*!
 * Result decoder
 *
 * Reads the artifact header, picks raw or gzip from it, checks integrity and
 * rebuilds the `OptimizeResult`. Decoding never runs code: embedded
 * callables come back as opaque bytes and are reported as trust advisories.
 */

use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::result::{ObjectiveCallable, OptimizeResult};
use crate::storage::error::{DecodeError, DecodeResult, DecodeStage};
use crate::storage::format::{ArtifactHeader, BodyEncoding, HEADER_LEN};
use crate::storage::options::DecodeOptions;
use crate::storage::schema::{callable_locations, validate_decoded};

/// Where an artifact is read from
pub enum Source<'a> {
    Path(&'a Path),
    Reader(&'a mut dyn Read),
}

impl<'a> Source<'a> {
    pub fn reader(reader: &'a mut dyn Read) -> Self {
        Source::Reader(reader)
    }
}

impl<'a> From<&'a Path> for Source<'a> {
    fn from(path: &'a Path) -> Self {
        Source::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for Source<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Source::Path(path.as_path())
    }
}

/// Advisory attached to every decoded artifact that carries a callable.
///
/// The decoder only restores bytes. Resolving them through an
/// `ObjectiveRegistry` runs caller-registered code on attacker-controlled
/// input if the artifact was forged, so callables from untrusted sources
/// must not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustBoundaryWarning {
    /// Location of the callable, e.g. `specs.args.func`
    pub field: String,
    pub kind: String,
}

impl fmt::Display for TrustBoundaryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} holds a `{}` callable; resolve it only if the artifact comes from a trusted source",
            self.field, self.kind
        )
    }
}

#[derive(Debug, Clone)]
pub struct DecodeReport {
    pub result: OptimizeResult,
    pub header: ArtifactHeader,
    pub warnings: Vec<TrustBoundaryWarning>,
}

#[derive(Debug, Clone, Default)]
pub struct ResultDecoder {
    options: DecodeOptions,
}

impl ResultDecoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn decode(&self, source: Source<'_>) -> DecodeResult<OptimizeResult> {
        self.decode_with_report(source).map(|report| report.result)
    }

    pub fn decode_slice(&self, mut bytes: &[u8]) -> DecodeResult<OptimizeResult> {
        self.decode(Source::Reader(&mut bytes))
    }

    pub fn decode_with_report(&self, source: Source<'_>) -> DecodeResult<DecodeReport> {
        match source {
            Source::Path(path) => {
                let file = File::open(path)
                    .map_err(|e| DecodeError::io(format!("opening {}", path.display()), e))?;
                debug!("decoding result from {}", path.display());
                let mut reader = BufReader::new(file);
                let report = self.read_artifact(&mut reader)?;
                ensure_consumed(&mut reader, path)?;
                Ok(report)
            }
            Source::Reader(reader) => self.read_artifact(reader),
        }
    }

    fn read_artifact(&self, reader: &mut dyn Read) -> DecodeResult<DecodeReport> {
        let header = read_header(reader)?;

        if header.body_len > self.options.max_artifact_size {
            return Err(DecodeError::corrupt(
                DecodeStage::Header,
                format!(
                    "declared body of {} bytes exceeds limit of {} bytes",
                    header.body_len, self.options.max_artifact_size
                ),
            ));
        }

        let body = read_body(reader, header.body_len)?;

        if self.options.verify_checksum && !header.verify(&body) {
            return Err(DecodeError::corrupt(
                DecodeStage::Checksum,
                format!("body does not match checksum {}", header.checksum_prefix()),
            ));
        }

        let payload = match header.encoding {
            BodyEncoding::Raw => body,
            BodyEncoding::Gzip => decompress(&body, self.options.max_artifact_size)?,
        };

        debug!(
            "decoding body: encoding={:?}, {} bytes",
            header.encoding,
            payload.len()
        );

        let result = read_result(&payload)?;
        validate_decoded(&result)?;

        let warnings = trust_warnings(&result);
        for warning in &warnings {
            warn!("{}", warning);
        }

        Ok(DecodeReport {
            result,
            header,
            warnings,
        })
    }
}

fn read_header(reader: &mut dyn Read) -> DecodeResult<ArtifactHeader> {
    let mut bytes = [0u8; HEADER_LEN];
    reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            DecodeError::corrupt(DecodeStage::Header, "stream ends inside the header")
        }
        _ => DecodeError::io("reading artifact header", e),
    })?;
    ArtifactHeader::parse(&bytes)
}

fn read_body(reader: &mut dyn Read, body_len: u64) -> DecodeResult<Vec<u8>> {
    let mut body = Vec::new();
    reader
        .take(body_len)
        .read_to_end(&mut body)
        .map_err(|e| DecodeError::io("reading artifact body", e))?;

    if (body.len() as u64) < body_len {
        return Err(DecodeError::corrupt(
            DecodeStage::Body,
            format!("expected {} body bytes, found {}", body_len, body.len()),
        ));
    }
    Ok(body)
}

/// Inflate a gzip body, refusing to produce more than `limit` bytes.
fn decompress(body: &[u8], limit: u64) -> DecodeResult<Vec<u8>> {
    let mut payload = Vec::new();
    GzDecoder::new(body)
        .take(limit.saturating_add(1))
        .read_to_end(&mut payload)
        .map_err(|e| DecodeError::corrupt(DecodeStage::Decompress, e.to_string()))?;

    if payload.len() as u64 > limit {
        return Err(DecodeError::corrupt(
            DecodeStage::Decompress,
            format!("inflated body exceeds limit of {} bytes", limit),
        ));
    }
    Ok(payload)
}

/// Deserialize exactly one result from `payload`; leftover bytes mean the
/// body was not written by this encoder.
fn read_result(payload: &[u8]) -> DecodeResult<OptimizeResult> {
    let mut remaining = payload;
    let result = OptimizeResult::deserialize(&mut rmp_serde::Deserializer::new(&mut remaining))?;

    if !remaining.is_empty() {
        return Err(DecodeError::corrupt(
            DecodeStage::Structure,
            format!("{} trailing bytes after the result", remaining.len()),
        ));
    }
    Ok(result)
}

fn ensure_consumed(reader: &mut dyn Read, path: &Path) -> DecodeResult<()> {
    let mut next = [0u8; 1];
    let extra = reader
        .read(&mut next)
        .map_err(|e| DecodeError::io(format!("reading {}", path.display()), e))?;

    if extra > 0 {
        return Err(DecodeError::corrupt(
            DecodeStage::Structure,
            format!("{} continues past the declared body", path.display()),
        ));
    }
    Ok(())
}

fn trust_warnings(result: &OptimizeResult) -> Vec<TrustBoundaryWarning> {
    callable_locations(result)
        .into_iter()
        .filter_map(|(field, callable)| match callable {
            ObjectiveCallable::Opaque(opaque) => Some(TrustBoundaryWarning {
                field,
                kind: opaque.kind,
            }),
            _ => None,
        })
        .collect()
}

/// Decode an artifact from `source` with default options.
pub fn decode(source: Source<'_>) -> DecodeResult<OptimizeResult> {
    ResultDecoder::default().decode(source)
}

/// Decode the artifact stored at `path` with default options.
pub fn load(path: impl AsRef<Path>) -> DecodeResult<OptimizeResult> {
    ResultDecoder::default().decode(Source::Path(path.as_ref()))
}
