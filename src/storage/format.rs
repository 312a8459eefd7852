/*!
 * Artifact container format
 *
 * Every artifact starts with a fixed 52 byte header:
 *
 * | offset | size | field                                   |
 * |--------|------|-----------------------------------------|
 * | 0      | 4    | magic `OPTR`                            |
 * | 4      | 1    | container format version                |
 * | 5      | 1    | body encoding (0 raw, 1 gzip)           |
 * | 6      | 1    | compression level used                  |
 * | 7      | 1    | reserved, zero                          |
 * | 8      | 4    | schema version, u32 little-endian       |
 * | 12     | 8    | body length, u64 little-endian          |
 * | 20     | 32   | SHA-256 of the body                     |
 *
 * The body is the named-field MessagePack encoding of the result, wrapped
 * in a gzip stream when the encoding byte says so.
 */

use sha2::{Digest, Sha256};

use crate::storage::error::{DecodeError, DecodeResult, DecodeStage};

pub const MAGIC: [u8; 4] = *b"OPTR";
pub const FORMAT_VERSION: u8 = 1;
pub const SCHEMA_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    Raw,
    Gzip,
}

impl BodyEncoding {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::Gzip => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Raw),
            1 => Some(Self::Gzip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub format_version: u8,
    pub encoding: BodyEncoding,
    pub compression_level: u8,
    pub schema_version: u32,
    pub body_len: u64,
    pub checksum: [u8; 32],
}

impl ArtifactHeader {
    /// Header describing `body` as it will be written.
    pub fn for_body(encoding: BodyEncoding, compression_level: u8, body: &[u8]) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            encoding,
            compression_level,
            schema_version: SCHEMA_VERSION,
            body_len: body.len() as u64,
            checksum: checksum(body),
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4] = self.format_version;
        bytes[5] = self.encoding.as_byte();
        bytes[6] = self.compression_level;
        bytes[8..12].copy_from_slice(&self.schema_version.to_le_bytes());
        bytes[12..20].copy_from_slice(&self.body_len.to_le_bytes());
        bytes[20..52].copy_from_slice(&self.checksum);
        bytes
    }

    pub fn parse(bytes: &[u8; HEADER_LEN]) -> DecodeResult<Self> {
        if bytes[0..4] != MAGIC {
            return Err(DecodeError::schema(format!(
                "unrecognized magic {}",
                hex::encode(&bytes[0..4])
            )));
        }

        let format_version = bytes[4];
        if format_version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                version: format_version,
            });
        }

        let encoding = BodyEncoding::from_byte(bytes[5]).ok_or_else(|| {
            DecodeError::corrupt(
                DecodeStage::Header,
                format!("unknown body encoding {}", bytes[5]),
            )
        })?;

        let schema_version = u32::from_le_bytes(read_array(&bytes[8..12]));
        if schema_version != SCHEMA_VERSION {
            return Err(DecodeError::schema(format!(
                "schema version {} (expected {})",
                schema_version, SCHEMA_VERSION
            )));
        }

        Ok(Self {
            format_version,
            encoding,
            compression_level: bytes[6],
            schema_version,
            body_len: u64::from_le_bytes(read_array(&bytes[12..20])),
            checksum: read_array(&bytes[20..52]),
        })
    }

    pub fn verify(&self, body: &[u8]) -> bool {
        checksum(body) == self.checksum
    }

    /// Short hex prefix of the checksum for log lines
    pub fn checksum_prefix(&self) -> String {
        hex::encode(&self.checksum[..8])
    }
}

pub fn checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    read_array(&hasher.finalize())
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}
