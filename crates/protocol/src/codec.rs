//! Text encoding and validation of envelopes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use crate::compression;
use crate::constants::{CRC32_HEX_LEN, MAX_TOTAL_CHUNKS, PROTOCOL_VERSION, SHA256_HEX_LEN};
use crate::envelope::{DataChunk, Envelope, EnvelopeBody, EnvelopeKind};
use crate::error::ProtocolError;
use crate::integrity::{is_hex_of_len, verify_crc32};

/// Base64-encodes chunk bytes for the `data` field.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes the `data` field of a chunk.
pub fn decode_payload(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

/// Serializes an envelope to single-line JSON.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(ProtocolError::Encode)
}

/// Parses envelope text.
///
/// Checks run in order: JSON syntax, `version`, `type`, required keys,
/// then typed fields. The first failing check decides the error.
pub fn decode_envelope(text: &str) -> Result<Envelope, ProtocolError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let Value::Object(map) = &value else {
        return Err(ProtocolError::Malformed(
            "envelope is not a JSON object".into(),
        ));
    };

    let version = match map.get("version") {
        None | Some(Value::Null) => {
            return Err(ProtocolError::StructuralInvalid(vec!["version".into()]));
        }
        Some(Value::String(v)) => v.clone(),
        Some(other) => {
            return Err(ProtocolError::Malformed(format!(
                "version must be a string, got {other}"
            )));
        }
    };
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION.to_string(),
            found: version,
        });
    }

    let kind = match map.get("type") {
        None | Some(Value::Null) => {
            return Err(ProtocolError::StructuralInvalid(vec!["type".into()]));
        }
        Some(Value::String(t)) => {
            EnvelopeKind::from_wire(t).ok_or_else(|| ProtocolError::UnknownType(t.clone()))?
        }
        Some(other) => {
            return Err(ProtocolError::Malformed(format!(
                "type must be a string, got {other}"
            )));
        }
    };

    let missing = missing_fields(&value, kind.required_fields());
    if !missing.is_empty() {
        return Err(ProtocolError::StructuralInvalid(missing));
    }

    let malformed = |e: serde_json::Error| ProtocolError::Malformed(format!("{kind}: {e}"));
    let body = match kind {
        EnvelopeKind::Header => {
            EnvelopeBody::Header(serde_json::from_value(value).map_err(malformed)?)
        }
        EnvelopeKind::Data => EnvelopeBody::Data(serde_json::from_value(value).map_err(malformed)?),
        EnvelopeKind::Footer => {
            EnvelopeBody::Footer(serde_json::from_value(value).map_err(malformed)?)
        }
    };

    Ok(Envelope { version, body })
}

fn missing_fields(value: &Value, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|path| {
            let pointer = format!("/{}", path.replace('.', "/"));
            value.pointer(&pointer).is_none_or(Value::is_null)
        })
        .map(|path| path.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Result of a structural check.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Fails with `VERSION_MISMATCH` unless the envelope carries
/// [`PROTOCOL_VERSION`].
pub fn check_version(envelope: &Envelope) -> Result<(), ProtocolError> {
    if envelope.version == PROTOCOL_VERSION {
        return Ok(());
    }
    Err(ProtocolError::VersionMismatch {
        expected: PROTOCOL_VERSION.to_string(),
        found: envelope.version.clone(),
    })
}

/// Structural check of a decoded envelope.
///
/// Does not verify the chunk checksum; see [`verify_data_crc`].
pub fn validate_envelope(envelope: &Envelope) -> Validation {
    let mut errors = Vec::new();

    if envelope.version.is_empty() {
        errors.push("missing version".to_string());
    } else if let Err(e) = check_version(envelope) {
        errors.push(e.to_string());
    }

    match &envelope.body {
        EnvelopeBody::Header(header) => {
            let info = &header.file_info;
            if info.file_name.trim().is_empty() {
                errors.push("missing fileInfo.fileName".to_string());
            }
            if !is_hex_of_len(&info.sha256, SHA256_HEX_LEN) {
                errors.push("fileInfo.sha256 is not a SHA-256 hex digest".to_string());
            }
            if header.total_chunks > MAX_TOTAL_CHUNKS {
                errors.push(format!(
                    "totalChunks {} exceeds {MAX_TOTAL_CHUNKS}",
                    header.total_chunks
                ));
            } else if u64::from(header.total_chunks) > info.file_size {
                errors.push(format!(
                    "totalChunks {} exceeds fileSize {}",
                    header.total_chunks, info.file_size
                ));
            } else if header.chunk_size > 0 {
                let expected = info.file_size.div_ceil(u64::from(header.chunk_size));
                if expected != u64::from(header.total_chunks) {
                    errors.push(format!(
                        "totalChunks {} does not cover fileSize {} at chunkSize {}",
                        header.total_chunks, info.file_size, header.chunk_size
                    ));
                }
            }
        }
        EnvelopeBody::Data(chunk) => {
            if chunk.total == 0 {
                errors.push("total must be positive".to_string());
            } else if chunk.total > MAX_TOTAL_CHUNKS {
                errors.push(format!("total {} exceeds {MAX_TOTAL_CHUNKS}", chunk.total));
            } else if chunk.index >= chunk.total {
                errors.push(format!(
                    "index {} out of range for total {}",
                    chunk.index, chunk.total
                ));
            }
            if chunk.payload.is_empty() {
                errors.push("missing data".to_string());
            }
            if !is_hex_of_len(&chunk.crc32, CRC32_HEX_LEN) {
                errors.push("crc32 is not 8 hex digits".to_string());
            }
        }
        EnvelopeBody::Footer(footer) => {
            if !is_hex_of_len(&footer.summary.sha256, SHA256_HEX_LEN) {
                errors.push("summary.sha256 is not a SHA-256 hex digest".to_string());
            }
            if footer.summary.total_chunks > MAX_TOTAL_CHUNKS {
                errors.push(format!(
                    "summary.totalChunks {} exceeds {MAX_TOTAL_CHUNKS}",
                    footer.summary.total_chunks
                ));
            }
        }
    }

    Validation::from_errors(errors)
}

// ---------------------------------------------------------------------------
// Chunk payload
// ---------------------------------------------------------------------------

/// Recomputes the CRC32 of the sent bytes and compares it to `chunk.crc32`.
///
/// Undecodable payloads fail the check.
pub fn verify_data_crc(chunk: &DataChunk) -> bool {
    match decode_payload(&chunk.payload) {
        Ok(bytes) => verify_crc32(&bytes, &chunk.crc32),
        Err(_) => false,
    }
}

/// Returns the original bytes of a chunk, undoing per-chunk compression.
pub fn extract_chunk_bytes(chunk: &DataChunk) -> Result<Vec<u8>, ProtocolError> {
    let sent = decode_payload(&chunk.payload).map_err(|e| ProtocolError::Extract {
        index: chunk.index,
        reason: format!("invalid base64: {e}"),
    })?;

    if !chunk.compressed {
        return Ok(sent);
    }

    compression::decompress(&sent).map_err(|e| ProtocolError::Extract {
        index: chunk.index,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{FileFooter, FileHeader, FileInfo, TransferSummary};
    use crate::integrity::sha256_hex;

    fn header_envelope() -> Envelope {
        Envelope::header(FileHeader {
            timestamp: 42,
            file_info: FileInfo {
                file_name: "notes.md".into(),
                file_size: 11,
                file_type: "text/markdown".into(),
                sha256: sha256_hex(b"hello world"),
                content_encoding: None,
                original_size: None,
            },
            total_chunks: 1,
            chunk_size: 1024,
        })
    }

    #[test]
    fn encode_decode_each_kind() {
        let footer = Envelope::footer(FileFooter {
            timestamp: 42,
            summary: TransferSummary {
                total_chunks: 1,
                total_size: 11,
                sha256: sha256_hex(b"hello world"),
            },
        });
        let data = Envelope::data(DataChunk::from_bytes(b"hello world", 0, 1, false));

        for env in [header_envelope(), data, footer] {
            let text = encode_envelope(&env).unwrap();
            assert!(!text.contains('\n'));
            assert_eq!(decode_envelope(&text).unwrap(), env);
        }
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = decode_envelope("not json at all").unwrap_err();
        assert_eq!(err.code(), "MALFORMED");
    }

    #[test]
    fn decode_rejects_non_object() {
        let err = decode_envelope("[1,2,3]").unwrap_err();
        assert_eq!(err.code(), "MALFORMED");
    }

    #[test]
    fn decode_rejects_other_version() {
        let err =
            decode_envelope(r#"{"version":"2.0","type":"FILE_DATA","index":0}"#).unwrap_err();
        match err {
            ProtocolError::VersionMismatch { expected, found } => {
                assert_eq!(expected, "1.0");
                assert_eq!(found, "2.0");
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn decode_missing_version_is_structural() {
        let err = decode_envelope(r#"{"type":"FILE_DATA"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::StructuralInvalid(ref f) if f == &["version"]));
    }

    #[test]
    fn decode_numeric_version_is_malformed() {
        let err = decode_envelope(r#"{"version":1.0,"type":"FILE_DATA"}"#).unwrap_err();
        assert_eq!(err.code(), "MALFORMED");
    }

    #[test]
    fn decode_unknown_type() {
        let err = decode_envelope(r#"{"version":"1.0","type":"FILE_TRAILER"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "FILE_TRAILER"));
    }

    #[test]
    fn decode_lists_missing_data_fields() {
        let err = decode_envelope(r#"{"version":"1.0","type":"FILE_DATA","index":0,"data":null}"#)
            .unwrap_err();
        match err {
            ProtocolError::StructuralInvalid(fields) => {
                assert_eq!(fields, vec!["total", "data", "crc32"]);
            }
            other => panic!("expected structural error, got {other:?}"),
        }
    }

    #[test]
    fn decode_missing_nested_header_field() {
        let err = decode_envelope(
            r#"{"version":"1.0","type":"FILE_HEADER","fileInfo":{"fileName":"a"},"totalChunks":1}"#,
        )
        .unwrap_err();
        match err {
            ProtocolError::StructuralInvalid(fields) => {
                assert_eq!(fields, vec!["fileInfo.fileSize", "fileInfo.sha256"]);
            }
            other => panic!("expected structural error, got {other:?}"),
        }
    }

    #[test]
    fn decode_wrong_field_type_is_malformed() {
        let err = decode_envelope(
            r#"{"version":"1.0","type":"FILE_DATA","index":"zero","total":1,"data":"AA==","crc32":"d202ef8d"}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "MALFORMED");
    }

    #[test]
    fn decode_tolerates_missing_optional_fields() {
        let env = decode_envelope(
            r#"{"version":"1.0","type":"FILE_DATA","index":0,"total":1,"data":"AA==","crc32":"d202ef8d"}"#,
        )
        .unwrap();
        let chunk = env.as_data().unwrap();
        assert!(!chunk.compressed);
        assert_eq!(chunk.size, 0);
        assert!(verify_data_crc(chunk));
    }

    #[test]
    fn validate_accepts_well_formed() {
        let v = validate_envelope(&header_envelope());
        assert!(v.valid, "{:?}", v.errors);
        let data = Envelope::data(DataChunk::from_bytes(b"x", 2, 3, false));
        assert!(validate_envelope(&data).valid);
    }

    #[test]
    fn validate_flags_index_out_of_range() {
        let data = Envelope::data(DataChunk::from_bytes(b"x", 3, 3, false));
        let v = validate_envelope(&data);
        assert!(!v.valid);
        assert_eq!(v.errors, vec!["index 3 out of range for total 3"]);
    }

    #[test]
    fn validate_flags_zero_total_and_bad_crc() {
        let mut chunk = DataChunk::from_bytes(b"x", 0, 0, false);
        chunk.crc32 = "xyz".into();
        let v = validate_envelope(&Envelope::data(chunk));
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 2);
    }

    #[test]
    fn validate_flags_empty_version_and_name() {
        let mut env = header_envelope();
        env.version.clear();
        if let EnvelopeBody::Header(h) = &mut env.body {
            h.file_info.file_name = "  ".into();
        }
        let v = validate_envelope(&env);
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 2);
    }

    #[test]
    fn validate_flags_other_version() {
        let mut env = Envelope::data(DataChunk::from_bytes(b"x", 0, 1, false));
        env.version = "2.0".into();
        let v = validate_envelope(&env);
        assert!(!v.valid);
        assert_eq!(v.errors, vec!["protocol version mismatch: expected 1.0, found 2.0"]);
        assert_eq!(check_version(&env).unwrap_err().code(), "VERSION_MISMATCH");
    }

    #[test]
    fn validate_bounds_chunk_totals() {
        let data = Envelope::data(DataChunk::from_bytes(b"\x01", 0, u32::MAX, false));
        assert_eq!(
            validate_envelope(&data).errors,
            vec![format!("total {} exceeds 65536", u32::MAX)]
        );

        let mut env = header_envelope();
        if let EnvelopeBody::Header(h) = &mut env.body {
            h.total_chunks = u32::MAX;
        }
        assert!(!validate_envelope(&env).valid);
    }

    #[test]
    fn validate_header_chunk_arithmetic() {
        let mut env = header_envelope();
        if let EnvelopeBody::Header(h) = &mut env.body {
            h.chunk_size = 4;
            h.total_chunks = 3;
        }
        assert!(validate_envelope(&env).valid);

        if let EnvelopeBody::Header(h) = &mut env.body {
            h.total_chunks = 4;
        }
        assert_eq!(
            validate_envelope(&env).errors,
            vec!["totalChunks 4 does not cover fileSize 11 at chunkSize 4"]
        );

        // Without a chunk size every chunk still holds at least one byte.
        if let EnvelopeBody::Header(h) = &mut env.body {
            h.chunk_size = 0;
            h.total_chunks = 12;
        }
        assert!(!validate_envelope(&env).valid);
    }

    #[test]
    fn crc_verification_detects_bit_flip() {
        let mut chunk = DataChunk::from_bytes(b"payload bytes", 0, 1, false);
        assert!(verify_data_crc(&chunk));

        let mut bytes = decode_payload(&chunk.payload).unwrap();
        bytes[0] ^= 0x01;
        chunk.payload = encode_payload(&bytes);
        assert!(!verify_data_crc(&chunk));
    }

    #[test]
    fn crc_verification_is_case_insensitive() {
        let mut chunk = DataChunk::from_bytes(b"123456789", 0, 1, false);
        chunk.crc32 = chunk.crc32.to_uppercase();
        assert!(verify_data_crc(&chunk));
    }

    #[test]
    fn crc_verification_fails_on_bad_base64() {
        let mut chunk = DataChunk::from_bytes(b"abc", 0, 1, false);
        chunk.payload = "!!!not base64!!!".into();
        assert!(!verify_data_crc(&chunk));
    }

    #[test]
    fn extract_reports_bad_base64() {
        let mut chunk = DataChunk::from_bytes(b"abc", 7, 8, false);
        chunk.payload = "%%%".into();
        let err = extract_chunk_bytes(&chunk).unwrap_err();
        assert!(matches!(err, ProtocolError::Extract { index: 7, .. }));
        assert_eq!(err.code(), "EXTRACT_ERROR");
    }

    #[test]
    fn extract_reports_bad_gzip() {
        let mut chunk = DataChunk::from_bytes(b"plain", 1, 2, false);
        chunk.compressed = true;
        let err = extract_chunk_bytes(&chunk).unwrap_err();
        assert!(matches!(err, ProtocolError::Extract { index: 1, .. }));
    }
}
