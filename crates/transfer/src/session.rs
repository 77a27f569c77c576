use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use qrferry_protocol::integrity::sha256_hex;
use qrferry_protocol::{
    ContentEncoding, DataChunk, Envelope, EnvelopeBody, EnvelopeKind, FileFooter, FileHeader,
    FileInfo, check_version, compression, decode_envelope, extract_chunk_bytes,
    validate_envelope, verify_data_crc,
};

use crate::TransferError;

/// Outcome of feeding one envelope to a [`TransferSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// First header stored.
    Header { total_chunks: u32 },
    /// First footer stored.
    Footer,
    /// Data chunk stored at a previously empty index.
    NewChunk {
        index: u32,
        received: u32,
        total: u32,
        /// Fraction of chunks received, `0.0..=1.0`.
        progress: f64,
    },
    /// Already held; the session is unchanged.
    Duplicate {
        kind: EnvelopeKind,
        index: Option<u32>,
    },
    /// Dropped; the session is unchanged.
    Rejected(RejectReason),
}

impl Ingest {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Ingest::Rejected(_))
    }

    pub fn is_new(&self) -> bool {
        matches!(
            self,
            Ingest::Header { .. } | Ingest::Footer | Ingest::NewChunk { .. }
        )
    }
}

/// Why an envelope was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Text could not be decoded into an envelope.
    Decode { code: &'static str, message: String },
    /// Envelope carries an unsupported protocol version.
    VersionMismatch { found: String },
    /// Structural validation failed.
    Invalid(Vec<String>),
    /// Payload bytes do not match the chunk's CRC32.
    CrcMismatch { index: u32 },
    /// Chunk `total` disagrees with the header's `totalChunks`.
    TotalMismatch { index: u32, expected: u32, found: u32 },
    /// Footer summary contradicts the header; lists the fields that differ.
    FooterMismatch(Vec<&'static str>),
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Decode { code, .. } => *code,
            RejectReason::VersionMismatch { .. } => "VERSION_MISMATCH",
            RejectReason::Invalid(_) => "STRUCTURAL_INVALID",
            RejectReason::CrcMismatch { .. } => "CRC_MISMATCH",
            RejectReason::TotalMismatch { .. } => "TOTAL_MISMATCH",
            RejectReason::FooterMismatch(_) => "FOOTER_MISMATCH",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Decode { code, message } => write!(f, "{code}: {message}"),
            RejectReason::VersionMismatch { found } => {
                write!(f, "unsupported protocol version {found:?}")
            }
            RejectReason::Invalid(errors) => write!(f, "invalid envelope: {}", errors.join("; ")),
            RejectReason::CrcMismatch { index } => write!(f, "chunk {index}: CRC32 mismatch"),
            RejectReason::TotalMismatch {
                index,
                expected,
                found,
            } => write!(f, "chunk {index}: total {found}, header declares {expected}"),
            RejectReason::FooterMismatch(fields) => {
                write!(f, "footer contradicts header: {}", fields.join(", "))
            }
        }
    }
}

/// Snapshot of reassembly progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub has_header: bool,
    pub has_footer: bool,
    pub total_chunks: Option<u32>,
    pub received_chunks: u32,
    pub missing_chunks: u32,
    /// Percentage of chunks received, `0.0..=100.0`.
    pub progress: f64,
    pub complete: bool,
}

/// A reconstructed and verified file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name as declared by the sender; see [`crate::sanitize_file_name`].
    pub file_name: String,
    pub file_type: String,
    /// File contents with any whole-file encoding removed.
    pub data: Vec<u8>,
    /// Digest of the transmitted payload.
    pub sha256: String,
    /// Bytes transmitted, before whole-file decoding.
    pub transmitted_size: u64,
}

/// Receiver-side reassembler for one transfer.
///
/// Envelopes may arrive in any order, any number of times. A chunk index is
/// stored once and never overwritten.
#[derive(Debug, Default)]
pub struct TransferSession {
    header: Option<FileHeader>,
    footer: Option<FileFooter>,
    chunks: BTreeMap<u32, DataChunk>,
}

impl TransferSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `text` and feeds the envelope to the session.
    pub fn add_text(&mut self, text: &str) -> Ingest {
        match decode_envelope(text) {
            Ok(envelope) => self.add_envelope(envelope),
            Err(e) => {
                debug!(code = e.code(), error = %e, "envelope dropped");
                Ingest::Rejected(RejectReason::Decode {
                    code: e.code(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Feeds one decoded envelope to the session.
    pub fn add_envelope(&mut self, envelope: Envelope) -> Ingest {
        if check_version(&envelope).is_err() {
            debug!(version = %envelope.version, "unsupported envelope version");
            return Ingest::Rejected(RejectReason::VersionMismatch {
                found: envelope.version,
            });
        }

        let validation = validate_envelope(&envelope);
        if !validation.valid {
            debug!(
                kind = %envelope.kind(),
                errors = ?validation.errors,
                "envelope failed validation"
            );
            return Ingest::Rejected(RejectReason::Invalid(validation.errors));
        }

        match envelope.body {
            EnvelopeBody::Header(header) => self.add_header(header),
            EnvelopeBody::Data(chunk) => self.add_chunk(chunk),
            EnvelopeBody::Footer(footer) => self.add_footer(footer),
        }
    }

    fn add_header(&mut self, header: FileHeader) -> Ingest {
        if let Some(existing) = &self.header {
            if existing != &header {
                warn!(
                    file = %header.file_info.file_name,
                    "conflicting header ignored, keeping the first"
                );
            }
            return Ingest::Duplicate {
                kind: EnvelopeKind::Header,
                index: None,
            };
        }

        let total_chunks = header.total_chunks;
        let before = self.chunks.len();
        self.chunks.retain(|_, chunk| chunk.total == total_chunks);
        let evicted = before - self.chunks.len();
        if evicted > 0 {
            warn!(evicted, total_chunks, "dropped chunks that disagree with header");
        }
        if let Some(footer) = &self.footer {
            let fields = contradictions(&header, footer);
            if !fields.is_empty() {
                warn!(?fields, "dropped footer that disagrees with header");
                self.footer = None;
            }
        }

        info!(
            file = %header.file_info.file_name,
            size = header.file_info.file_size,
            total_chunks,
            "header received"
        );
        self.header = Some(header);
        Ingest::Header { total_chunks }
    }

    fn add_footer(&mut self, footer: FileFooter) -> Ingest {
        if let Some(existing) = &self.footer {
            if existing != &footer {
                warn!("conflicting footer ignored, keeping the first");
            }
            return Ingest::Duplicate {
                kind: EnvelopeKind::Footer,
                index: None,
            };
        }

        if let Some(header) = &self.header {
            let fields = contradictions(header, &footer);
            if !fields.is_empty() {
                warn!(?fields, "footer disagrees with header");
                return Ingest::Rejected(RejectReason::FooterMismatch(fields));
            }
        }

        debug!(total_chunks = footer.summary.total_chunks, "footer received");
        self.footer = Some(footer);
        Ingest::Footer
    }

    fn add_chunk(&mut self, chunk: DataChunk) -> Ingest {
        let index = chunk.index;

        if let Some(expected) = self.header.as_ref().map(|h| h.total_chunks) {
            if chunk.total != expected {
                warn!(index, found = chunk.total, expected, "chunk total mismatch");
                return Ingest::Rejected(RejectReason::TotalMismatch {
                    index,
                    expected,
                    found: chunk.total,
                });
            }
        }

        if !verify_data_crc(&chunk) {
            warn!(index, "chunk failed CRC32 check");
            return Ingest::Rejected(RejectReason::CrcMismatch { index });
        }

        if self.chunks.contains_key(&index) {
            debug!(index, "duplicate chunk");
            return Ingest::Duplicate {
                kind: EnvelopeKind::Data,
                index: Some(index),
            };
        }

        let chunk_total = chunk.total;
        self.chunks.insert(index, chunk);

        let total = self.expected_total().unwrap_or(chunk_total);
        let received = self.received_count();
        debug!(index, received, total, "chunk stored");

        Ingest::NewChunk {
            index,
            received,
            total,
            progress: fraction(received, total),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    pub fn footer(&self) -> Option<&FileFooter> {
        self.footer.as_ref()
    }

    pub fn file_info(&self) -> Option<&FileInfo> {
        self.header.as_ref().map(|h| &h.file_info)
    }

    /// Chunk count declared by the header, or by a stored chunk when the
    /// header has not arrived yet.
    pub fn expected_total(&self) -> Option<u32> {
        self.header
            .as_ref()
            .map(|h| h.total_chunks)
            .or_else(|| self.chunks.values().next().map(|c| c.total))
    }

    pub fn received_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// Header, footer and every declared chunk are present.
    pub fn is_complete(&self) -> bool {
        match (&self.header, &self.footer) {
            (Some(header), Some(_)) => self.chunks.len() as u64 == u64::from(header.total_chunks),
            _ => false,
        }
    }

    /// Sorted indices not yet received. Empty until a total is known.
    pub fn missing_indices(&self) -> Vec<u32> {
        let Some(total) = self.expected_total() else {
            return Vec::new();
        };
        (0..total).filter(|i| !self.chunks.contains_key(i)).collect()
    }

    /// Number of indices not yet received, counted without listing them.
    pub fn missing_count(&self) -> u32 {
        let Some(total) = self.expected_total() else {
            return 0;
        };
        total - self.chunks.range(..total).count() as u32
    }

    pub fn stats(&self) -> SessionStats {
        let total = self.expected_total();
        let received = self.received_count();
        let missing = self.missing_count();
        SessionStats {
            has_header: self.header.is_some(),
            has_footer: self.footer.is_some(),
            total_chunks: total,
            received_chunks: received,
            missing_chunks: missing,
            progress: total.map(|t| fraction(received, t) * 100.0).unwrap_or(0.0),
            complete: self.is_complete(),
        }
    }

    // -----------------------------------------------------------------------
    // Reconstruction
    // -----------------------------------------------------------------------

    /// Concatenates chunk bytes in index order.
    pub fn reconstruct(&self) -> Result<Vec<u8>, TransferError> {
        let header = match &self.header {
            Some(header) if self.is_complete() => header,
            _ => return Err(self.incomplete()),
        };

        let mut out = Vec::new();
        for index in 0..header.total_chunks {
            let chunk = self.chunks.get(&index).ok_or_else(|| self.incomplete())?;
            out.extend_from_slice(&extract_chunk_bytes(chunk)?);
        }
        Ok(out)
    }

    /// Whether `bytes` match the header's declared size and digest.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        self.check(bytes).is_ok()
    }

    /// Like [`verify`](Self::verify) but reports which check failed.
    pub fn check(&self, bytes: &[u8]) -> Result<(), TransferError> {
        let info = self.file_info().ok_or_else(|| self.incomplete())?;

        let actual_size = bytes.len() as u64;
        if actual_size != info.file_size {
            return Err(TransferError::SizeMismatch {
                expected: info.file_size,
                actual: actual_size,
            });
        }

        let actual = sha256_hex(bytes);
        if !actual.eq_ignore_ascii_case(&info.sha256) {
            return Err(TransferError::DigestMismatch {
                expected: info.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Reconstructs, verifies and removes whole-file encoding.
    pub fn finish(&self) -> Result<ReceivedFile, TransferError> {
        let payload = self.reconstruct()?;
        if let Err(e) = self.check(&payload) {
            warn!(code = e.code(), error = %e, "reconstructed payload failed verification");
            return Err(e);
        }

        let info = self.file_info().ok_or_else(|| self.incomplete())?;
        let transmitted_size = payload.len() as u64;
        let data = match info.content_encoding {
            Some(ContentEncoding::Gzip) => compression::decompress(&payload)?,
            None => payload,
        };

        if let Some(expected) = info.original_size {
            let actual = data.len() as u64;
            if actual != expected {
                return Err(TransferError::SizeMismatch { expected, actual });
            }
        }

        info!(
            file = %info.file_name,
            size = data.len(),
            transmitted = transmitted_size,
            "transfer verified"
        );

        Ok(ReceivedFile {
            file_name: info.file_name.clone(),
            file_type: info.file_type.clone(),
            data,
            sha256: info.sha256.clone(),
            transmitted_size,
        })
    }

    /// Drops header, footer and all chunks.
    pub fn reset(&mut self) {
        self.header = None;
        self.footer = None;
        self.chunks.clear();
    }

    fn incomplete(&self) -> TransferError {
        TransferError::Incomplete {
            missing: self.missing_count() as usize,
            header: self.header.is_some(),
            footer: self.footer.is_some(),
        }
    }
}

/// Footer summary fields that disagree with `header`.
fn contradictions(header: &FileHeader, footer: &FileFooter) -> Vec<&'static str> {
    let summary = &footer.summary;
    let mut fields = Vec::new();
    if summary.total_chunks != header.total_chunks {
        fields.push("totalChunks");
    }
    if summary.total_size != header.file_info.file_size {
        fields.push("totalSize");
    }
    if !summary.sha256.eq_ignore_ascii_case(&header.file_info.sha256) {
        fields.push("sha256");
    }
    fields
}

fn fraction(received: u32, total: u32) -> f64 {
    if total == 0 {
        return 1.0;
    }
    f64::from(received) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileMeta, TransferOptions, create_transfer_package};
    use qrferry_protocol::codec::{decode_payload, encode_payload};
    use qrferry_protocol::encode_envelope;

    fn package(bytes: &[u8], chunk_size: usize) -> Vec<Envelope> {
        create_transfer_package(
            bytes,
            &FileMeta::new("data.bin", "application/octet-stream"),
            &TransferOptions {
                chunk_size,
                compress_chunks: true,
            },
        )
        .unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + i / 13) as u8).collect()
    }

    #[test]
    fn new_session_is_empty() {
        let session = TransferSession::new();
        assert!(!session.is_complete());
        assert!(session.missing_indices().is_empty());
        assert_eq!(session.expected_total(), None);
        assert!(matches!(
            session.reconstruct(),
            Err(TransferError::Incomplete { .. })
        ));
    }

    #[test]
    fn in_order_delivery_completes() {
        let bytes = pattern(3000);
        let mut session = TransferSession::new();
        for env in package(&bytes, 1000) {
            assert!(session.add_envelope(env).is_new());
        }
        assert!(session.is_complete());
        assert_eq!(session.reconstruct().unwrap(), bytes);
        assert!(session.verify(&bytes));
    }

    #[test]
    fn duplicate_chunk_is_idempotent() {
        let envelopes = package(&pattern(2500), 1000);
        let mut session = TransferSession::new();
        let first = session.add_envelope(envelopes[1].clone());
        assert!(matches!(first, Ingest::NewChunk { index: 0, received: 1, .. }));

        let second = session.add_envelope(envelopes[1].clone());
        assert_eq!(
            second,
            Ingest::Duplicate {
                kind: EnvelopeKind::Data,
                index: Some(0)
            }
        );
        assert!(second.is_accepted());
        assert_eq!(session.received_count(), 1);
    }

    #[test]
    fn second_header_is_duplicate_and_first_wins() {
        let a = package(&pattern(100), 50);
        let b = package(&pattern(300), 50);
        let mut session = TransferSession::new();
        assert_eq!(
            session.add_envelope(a[0].clone()),
            Ingest::Header { total_chunks: 2 }
        );
        let again = session.add_envelope(b[0].clone());
        assert!(matches!(
            again,
            Ingest::Duplicate {
                kind: EnvelopeKind::Header,
                ..
            }
        ));
        assert_eq!(session.header().unwrap().total_chunks, 2);
    }

    #[test]
    fn crc_mismatch_is_rejected_and_not_stored() {
        let envelopes = package(&pattern(1500), 1000);
        let mut env = envelopes[2].clone();
        if let EnvelopeBody::Data(chunk) = &mut env.body {
            let mut sent = decode_payload(&chunk.payload).unwrap();
            sent[3] ^= 0x80;
            chunk.payload = encode_payload(&sent);
        }

        let mut session = TransferSession::new();
        let outcome = session.add_envelope(env);
        assert_eq!(outcome, Ingest::Rejected(RejectReason::CrcMismatch { index: 1 }));
        assert!(!outcome.is_accepted());
        assert_eq!(session.received_count(), 0);
    }

    #[test]
    fn invalid_envelope_is_rejected() {
        let mut chunk = DataChunk::from_bytes(b"abc", 5, 5, false);
        chunk.crc32 = "zz".into();
        let mut session = TransferSession::new();
        match session.add_envelope(Envelope::data(chunk)) {
            Ingest::Rejected(reason) => {
                assert_eq!(reason.code(), "STRUCTURAL_INVALID");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_text_is_rejected() {
        let mut session = TransferSession::new();
        match session.add_text("{\"version\":\"9.9\",\"type\":\"FILE_DATA\"}") {
            Ingest::Rejected(reason) => assert_eq!(reason.code(), "VERSION_MISMATCH"),
            other => panic!("expected rejection, got {other:?}"),
        }
        match session.add_text("garbage") {
            Ingest::Rejected(reason) => assert_eq!(reason.code(), "MALFORMED"),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn add_text_accepts_encoded_frames() {
        let bytes = pattern(700);
        let mut session = TransferSession::new();
        for env in package(&bytes, 256) {
            let text = encode_envelope(&env).unwrap();
            assert!(session.add_text(&text).is_accepted());
        }
        assert_eq!(session.finish().unwrap().data, bytes);
    }

    #[test]
    fn other_version_is_rejected_without_decoding() {
        let mut session = TransferSession::new();
        for mut env in package(&pattern(3000), 1000) {
            env.version = "2.0".into();
            assert_eq!(
                session.add_envelope(env),
                Ingest::Rejected(RejectReason::VersionMismatch {
                    found: "2.0".into()
                })
            );
        }
        assert!(session.header().is_none());
        assert_eq!(session.received_count(), 0);
        assert_eq!(session.stats().total_chunks, None);
    }

    #[test]
    fn oversized_total_is_rejected() {
        let mut session = TransferSession::new();
        let outcome = session.add_text(
            r#"{"version":"1.0","type":"FILE_DATA","index":0,"total":4294967295,"data":"AQ==","size":1,"crc32":"a505df1b"}"#,
        );
        match outcome {
            Ingest::Rejected(reason) => assert_eq!(reason.code(), "STRUCTURAL_INVALID"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(session.expected_total(), None);
        assert!(session.missing_indices().is_empty());
    }

    #[test]
    fn incomplete_error_counts_missing_chunks() {
        let mut session = TransferSession::new();
        session.add_envelope(Envelope::data(DataChunk::from_bytes(b"\x01", 7, 60_000, false)));
        assert_eq!(session.missing_count(), 59_999);
        match session.reconstruct() {
            Err(TransferError::Incomplete {
                missing,
                header,
                footer,
            }) => {
                assert_eq!(missing, 59_999);
                assert!(!header);
                assert!(!footer);
            }
            other => panic!("expected incomplete, got {other:?}"),
        }
    }

    #[test]
    fn footer_contradicting_header_is_rejected() {
        let envelopes = package(&pattern(3000), 1000);
        let other = package(&pattern(4000), 1000);
        let mut session = TransferSession::new();
        session.add_envelope(envelopes[0].clone());

        match session.add_envelope(other[5].clone()) {
            Ingest::Rejected(RejectReason::FooterMismatch(fields)) => {
                assert_eq!(fields, vec!["totalChunks", "totalSize", "sha256"]);
            }
            outcome => panic!("expected footer mismatch, got {outcome:?}"),
        }
        assert!(session.footer().is_none());

        for env in &envelopes[1..] {
            session.add_envelope(env.clone());
        }
        assert!(session.is_complete());
        assert_eq!(session.finish().unwrap().data, pattern(3000));
    }

    #[test]
    fn footer_with_other_digest_is_rejected() {
        let envelopes = package(&pattern(2000), 1000);
        let mut footer = envelopes[3].clone();
        if let EnvelopeBody::Footer(f) = &mut footer.body {
            f.summary.sha256 = sha256_hex(b"something else");
        }
        let mut session = TransferSession::new();
        session.add_envelope(envelopes[0].clone());
        let outcome = session.add_envelope(footer);
        assert_eq!(
            outcome,
            Ingest::Rejected(RejectReason::FooterMismatch(vec!["sha256"]))
        );
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn late_header_drops_contradicting_footer() {
        let envelopes = package(&pattern(2000), 1000);
        let other = package(&pattern(2000).repeat(2), 1000);
        let mut session = TransferSession::new();
        assert_eq!(session.add_envelope(other[5].clone()), Ingest::Footer);

        session.add_envelope(envelopes[0].clone());
        assert!(session.footer().is_none());
        assert_eq!(session.add_envelope(envelopes[3].clone()), Ingest::Footer);
    }

    #[test]
    fn total_mismatch_after_header_is_rejected() {
        let envelopes = package(&pattern(3000), 1000);
        let other = package(&pattern(5000), 1000);
        let mut session = TransferSession::new();
        session.add_envelope(envelopes[0].clone());

        let outcome = session.add_envelope(other[1].clone());
        assert_eq!(
            outcome,
            Ingest::Rejected(RejectReason::TotalMismatch {
                index: 0,
                expected: 3,
                found: 5
            })
        );
        assert_eq!(session.received_count(), 0);
    }

    #[test]
    fn late_header_evicts_disagreeing_chunks() {
        let envelopes = package(&pattern(3000), 1000);
        let other = package(&pattern(5000), 1000);
        let mut session = TransferSession::new();
        session.add_envelope(other[4].clone());
        session.add_envelope(envelopes[2].clone());
        assert_eq!(session.received_count(), 2);

        session.add_envelope(envelopes[0].clone());
        assert_eq!(session.received_count(), 1);
        assert_eq!(session.missing_indices(), vec![0, 2]);
    }

    #[test]
    fn completion_needs_header_footer_and_all_chunks() {
        let envelopes = package(&pattern(2000), 1000);
        let (header, data, footer) = (&envelopes[0], &envelopes[1..3], &envelopes[3]);
        let mut session = TransferSession::new();

        for env in data {
            session.add_envelope(env.clone());
        }
        assert!(!session.is_complete());
        session.add_envelope(footer.clone());
        assert!(!session.is_complete());
        session.add_envelope(header.clone());
        assert!(session.is_complete());
    }

    #[test]
    fn missing_indices_are_sorted() {
        let envelopes = package(&pattern(5000), 1000);
        let mut session = TransferSession::new();
        session.add_envelope(envelopes[0].clone());
        session.add_envelope(envelopes[4].clone());
        session.add_envelope(envelopes[2].clone());
        assert_eq!(session.missing_indices(), vec![0, 2, 4]);

        let stats = session.stats();
        assert!(stats.has_header);
        assert!(!stats.has_footer);
        assert_eq!(stats.total_chunks, Some(5));
        assert_eq!(stats.received_chunks, 2);
        assert_eq!(stats.missing_chunks, 3);
        assert_eq!(stats.progress, 40.0);
        assert!(!stats.complete);
    }

    #[test]
    fn verify_detects_size_and_digest_changes() {
        let bytes = pattern(1200);
        let mut session = TransferSession::new();
        for env in package(&bytes, 500) {
            session.add_envelope(env);
        }
        let rebuilt = session.reconstruct().unwrap();
        assert!(session.verify(&rebuilt));

        let mut altered = rebuilt.clone();
        altered[600] = altered[600].wrapping_add(1);
        assert!(session.is_complete());
        assert!(!session.verify(&altered));
        assert!(matches!(
            session.check(&altered),
            Err(TransferError::DigestMismatch { .. })
        ));

        let truncated = &rebuilt[..1199];
        assert!(matches!(
            session.check(truncated),
            Err(TransferError::SizeMismatch {
                expected: 1200,
                actual: 1199
            })
        ));
    }

    #[test]
    fn empty_file_completes_with_header_and_footer() {
        let mut session = TransferSession::new();
        for env in package(b"", 1024) {
            session.add_envelope(env);
        }
        assert!(session.is_complete());
        let file = session.finish().unwrap();
        assert!(file.data.is_empty());
        assert_eq!(file.file_name, "data.bin");
    }

    #[test]
    fn finish_undoes_whole_file_gzip() {
        let original = b"line of text\n".repeat(200);
        let packed = compression::compress(&original).unwrap();
        let envelopes = create_transfer_package(
            &packed,
            &FileMeta::new("log.txt", "text/plain").gzipped(original.len() as u64),
            &TransferOptions {
                chunk_size: 64,
                compress_chunks: false,
            },
        )
        .unwrap();

        let mut session = TransferSession::new();
        for env in envelopes.into_iter().rev() {
            session.add_envelope(env);
        }
        let file = session.finish().unwrap();
        assert_eq!(file.data, original);
        assert_eq!(file.transmitted_size, packed.len() as u64);
        assert_eq!(file.file_type, "text/plain");
    }

    #[test]
    fn finish_checks_original_size() {
        let original = b"abcabcabc".repeat(50);
        let packed = compression::compress(&original).unwrap();
        let envelopes = create_transfer_package(
            &packed,
            &FileMeta::new("x.txt", "text/plain").gzipped(1),
            &TransferOptions::default(),
        )
        .unwrap();
        let mut session = TransferSession::new();
        for env in envelopes {
            session.add_envelope(env);
        }
        assert!(matches!(
            session.finish(),
            Err(TransferError::SizeMismatch { expected: 1, .. })
        ));
    }

    #[test]
    fn reset_clears_everything() {
        let mut session = TransferSession::new();
        for env in package(&pattern(900), 300) {
            session.add_envelope(env);
        }
        assert!(session.is_complete());
        session.reset();
        assert!(!session.is_complete());
        assert!(session.header().is_none());
        assert!(session.footer().is_none());
        assert_eq!(session.received_count(), 0);
    }
}
