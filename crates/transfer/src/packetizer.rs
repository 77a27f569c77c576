use serde::Serialize;
use tracing::debug;

use qrferry_protocol::constants::{DEFAULT_CHUNK_SIZE, MAX_TOTAL_CHUNKS};
use qrferry_protocol::integrity::sha256_hex;
use qrferry_protocol::{
    ContentEncoding, DataChunk, Envelope, FileFooter, FileHeader, FileInfo, ProtocolError,
    TransferSummary, encode_envelope,
};

use crate::TransferError;

/// Caller-supplied description of the payload.
///
/// Size and digest are computed by the packetizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub media_type: String,
    /// Whole-file encoding already applied to the payload, if any.
    pub content_encoding: Option<ContentEncoding>,
    /// Payload length before `content_encoding` was applied.
    pub original_size: Option<u64>,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            content_encoding: None,
            original_size: None,
        }
    }

    /// Marks the payload as gzip of a file `original_size` bytes long.
    pub fn gzipped(mut self, original_size: u64) -> Self {
        self.content_encoding = Some(ContentEncoding::Gzip);
        self.original_size = Some(original_size);
        self
    }
}

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub compress_chunks: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compress_chunks: true,
        }
    }
}

/// Number of data chunks needed for `len` bytes.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}

/// Splits `bytes` into the ordered envelope sequence: header, data chunks,
/// footer.
///
/// Data chunks are a pure function of `bytes` and `options`; only the
/// header and footer timestamps vary between calls.
pub fn create_transfer_package(
    bytes: &[u8],
    meta: &FileMeta,
    options: &TransferOptions,
) -> Result<Vec<Envelope>, TransferError> {
    if options.chunk_size == 0 {
        return Err(TransferError::InvalidChunkSize);
    }

    let chunks = chunk_count(bytes.len(), options.chunk_size);
    let total_chunks = u32::try_from(chunks)
        .ok()
        .filter(|&n| n <= MAX_TOTAL_CHUNKS)
        .ok_or(TransferError::TooManyChunks { chunks })?;
    let chunk_size =
        u32::try_from(options.chunk_size).map_err(|_| TransferError::InvalidChunkSize)?;

    let digest = sha256_hex(bytes);
    let timestamp = chrono::Utc::now().timestamp_millis();

    let mut envelopes = Vec::with_capacity(chunks + 2);
    envelopes.push(Envelope::header(FileHeader {
        timestamp,
        file_info: FileInfo {
            file_name: meta.name.clone(),
            file_size: bytes.len() as u64,
            file_type: meta.media_type.clone(),
            sha256: digest.clone(),
            content_encoding: meta.content_encoding,
            original_size: meta.original_size,
        },
        total_chunks,
        chunk_size,
    }));

    for (index, slice) in bytes.chunks(options.chunk_size).enumerate() {
        let chunk =
            DataChunk::from_bytes(slice, index as u32, total_chunks, options.compress_chunks);
        envelopes.push(Envelope::data(chunk));
    }

    envelopes.push(Envelope::footer(FileFooter {
        timestamp,
        summary: TransferSummary {
            total_chunks,
            total_size: bytes.len() as u64,
            sha256: digest,
        },
    }));

    debug!(
        file = %meta.name,
        size = bytes.len(),
        total_chunks,
        chunk_size,
        "transfer package created"
    );

    Ok(envelopes)
}

/// Encodes each envelope to its frame text, preserving order.
pub fn encode_package(envelopes: &[Envelope]) -> Result<Vec<String>, ProtocolError> {
    envelopes.iter().map(encode_envelope).collect()
}

/// Summary of a created package.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageStats {
    pub total_chunks: u32,
    pub chunk_size: u32,
    /// Sum of chunk lengths before per-chunk compression.
    pub payload_bytes: u64,
    /// Sum of chunk lengths as sent.
    pub sent_bytes: u64,
    /// Sum of frame text lengths, header and footer included.
    pub encoded_bytes: u64,
    pub compressed_chunks: u32,
    pub largest_frame: usize,
}

impl PackageStats {
    pub fn of(envelopes: &[Envelope], frames: &[String]) -> Self {
        let mut stats = PackageStats::default();
        for envelope in envelopes {
            if let Some(header) = envelope.as_header() {
                stats.total_chunks = header.total_chunks;
                stats.chunk_size = header.chunk_size;
            }
            if let Some(chunk) = envelope.as_data() {
                stats.payload_bytes += u64::from(chunk.original_size);
                stats.sent_bytes += u64::from(chunk.size);
                if chunk.compressed {
                    stats.compressed_chunks += 1;
                }
            }
        }
        stats.encoded_bytes = frames.iter().map(|f| f.len() as u64).sum();
        stats.largest_frame = frames.iter().map(String::len).max().unwrap_or(0);
        stats
    }
}
