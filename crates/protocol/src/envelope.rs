use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::encode_payload;
use crate::compression;
use crate::constants::{PROTOCOL_VERSION, TYPE_FILE_DATA, TYPE_FILE_FOOTER, TYPE_FILE_HEADER};
use crate::integrity::crc32_hex;

/// One self-describing unit of a transfer.
///
/// Serializes as a flat JSON object: `version`, `type`, then the fields of
/// the variant carried in `body`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    #[serde(flatten)]
    pub body: EnvelopeBody,
}

/// The three envelope variants, tagged on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EnvelopeBody {
    #[serde(rename = "FILE_HEADER")]
    Header(FileHeader),
    #[serde(rename = "FILE_DATA")]
    Data(DataChunk),
    #[serde(rename = "FILE_FOOTER")]
    Footer(FileFooter),
}

/// Discriminant of [`EnvelopeBody`] without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Header,
    Data,
    Footer,
}

impl EnvelopeKind {
    /// Name used in the `type` field.
    pub fn wire_name(self) -> &'static str {
        match self {
            EnvelopeKind::Header => TYPE_FILE_HEADER,
            EnvelopeKind::Data => TYPE_FILE_DATA,
            EnvelopeKind::Footer => TYPE_FILE_FOOTER,
        }
    }

    /// Parses a `type` field value.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            TYPE_FILE_HEADER => Some(EnvelopeKind::Header),
            TYPE_FILE_DATA => Some(EnvelopeKind::Data),
            TYPE_FILE_FOOTER => Some(EnvelopeKind::Footer),
            _ => None,
        }
    }

    /// Keys that must be present and non-null for this kind.
    ///
    /// Nested keys use dotted paths.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            EnvelopeKind::Header => &[
                "fileInfo",
                "fileInfo.fileName",
                "fileInfo.fileSize",
                "fileInfo.sha256",
                "totalChunks",
            ],
            EnvelopeKind::Data => &["index", "total", "data", "crc32"],
            EnvelopeKind::Footer => &[
                "summary",
                "summary.totalChunks",
                "summary.totalSize",
                "summary.sha256",
            ],
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Whole-file encoding applied before chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncoding {
    #[serde(rename = "gzip")]
    Gzip,
}

/// Describes the payload carried by a transfer.
///
/// `file_size` and `sha256` describe the bytes that were chunked. When
/// `content_encoding` is set those bytes are the encoded form and
/// `original_size` is the length after decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub file_name: String,
    pub file_size: u64,
    #[serde(default)]
    pub file_type: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHeader {
    #[serde(default)]
    pub timestamp: i64,
    pub file_info: FileInfo,
    pub total_chunks: u32,
    #[serde(default)]
    pub chunk_size: u32,
}

// ---------------------------------------------------------------------------
// Data
// ---------------------------------------------------------------------------

/// One ordered slice of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataChunk {
    pub index: u32,
    pub total: u32,
    /// Base64 of the chunk bytes as sent (compressed when `compressed`).
    #[serde(rename = "data")]
    pub payload: String,
    /// CRC32 of the bytes as sent, 8 hex digits.
    pub crc32: String,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub original_size: u32,
}

impl DataChunk {
    /// Builds the chunk for `bytes` at `index` of `total`.
    ///
    /// With `compress` set, the gzip form is used only when it is strictly
    /// smaller than `bytes`.
    pub fn from_bytes(bytes: &[u8], index: u32, total: u32, compress: bool) -> Self {
        let packed = if compress {
            match compression::compress(bytes) {
                Ok(packed) if packed.len() < bytes.len() => Some(packed),
                Ok(_) => None,
                Err(e) => {
                    warn!(index, error = %e, "chunk compression failed, sending raw");
                    None
                }
            }
        } else {
            None
        };

        let compressed = packed.is_some();
        let sent: &[u8] = packed.as_deref().unwrap_or(bytes);

        Self {
            index,
            total,
            payload: encode_payload(sent),
            crc32: crc32_hex(sent),
            compressed,
            size: sent.len() as u32,
            original_size: bytes.len() as u32,
        }
    }
}

// ---------------------------------------------------------------------------
// Footer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub total_chunks: u32,
    pub total_size: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFooter {
    #[serde(default)]
    pub timestamp: i64,
    pub summary: TransferSummary,
}

// ---------------------------------------------------------------------------
// Envelope helpers
// ---------------------------------------------------------------------------

impl Envelope {
    /// Wraps `body` with the current protocol version.
    pub fn new(body: EnvelopeBody) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            body,
        }
    }

    pub fn header(header: FileHeader) -> Self {
        Self::new(EnvelopeBody::Header(header))
    }

    pub fn data(chunk: DataChunk) -> Self {
        Self::new(EnvelopeBody::Data(chunk))
    }

    pub fn footer(footer: FileFooter) -> Self {
        Self::new(EnvelopeBody::Footer(footer))
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self.body {
            EnvelopeBody::Header(_) => EnvelopeKind::Header,
            EnvelopeBody::Data(_) => EnvelopeKind::Data,
            EnvelopeBody::Footer(_) => EnvelopeKind::Footer,
        }
    }

    pub fn as_header(&self) -> Option<&FileHeader> {
        match &self.body {
            EnvelopeBody::Header(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataChunk> {
        match &self.body {
            EnvelopeBody::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_footer(&self) -> Option<&FileFooter> {
        match &self.body {
            EnvelopeBody::Footer(f) => Some(f),
            _ => None,
        }
    }
}
