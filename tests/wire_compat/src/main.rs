fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use qrferry_protocol::{
        Envelope, EnvelopeKind, decode_envelope, encode_envelope, extract_chunk_bytes,
        validate_envelope, verify_data_crc,
    };
    use qrferry_transfer::{FileMeta, TransferOptions, TransferSession, create_transfer_package};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Decodes a fixture through the envelope codec, re-encodes it, and
    /// compares the JSON values (key order independent).
    fn roundtrip_test(name: &str) -> Envelope {
        let fixture = load_fixture(name);
        let envelope = decode_envelope(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));
        let text = encode_envelope(&envelope)
            .unwrap_or_else(|e| panic!("failed to encode {name}: {e}"));
        assert!(!text.contains('\n'), "{name}: envelope text must be one line");

        let reserialized: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        envelope
    }

    /// Decodes `fixture` after `mutate` and returns the error code.
    fn decode_code(name: &str, mutate: impl FnOnce(&mut serde_json::Value)) -> &'static str {
        let mut value = load_fixture(name);
        mutate(&mut value);
        decode_envelope(&value.to_string())
            .expect_err("mutated fixture must not decode")
            .code()
    }

    // --- Envelope fixtures ---

    #[test]
    fn fixture_header() {
        let envelope = roundtrip_test("header.json");
        let header = envelope.as_header().unwrap();
        assert_eq!(header.file_info.file_name, "hello.txt");
        assert_eq!(header.file_info.file_size, 12);
        assert_eq!(header.total_chunks, 2);
        assert_eq!(header.file_info.content_encoding, None);
        assert!(validate_envelope(&envelope).valid);
    }

    #[test]
    fn fixture_header_gzip() {
        let envelope = roundtrip_test("header_gzip.json");
        let info = &envelope.as_header().unwrap().file_info;
        assert_eq!(info.original_size, Some(360));
        assert!(info.content_encoding.is_some());
    }

    #[test]
    fn fixture_data() {
        let envelope = roundtrip_test("data.json");
        assert_eq!(envelope.kind(), EnvelopeKind::Data);
        let chunk = envelope.as_data().unwrap();
        assert!(verify_data_crc(chunk));
        assert_eq!(extract_chunk_bytes(chunk).unwrap(), b"hello wo");
    }

    #[test]
    fn fixture_data_compressed() {
        let envelope = roundtrip_test("data_compressed.json");
        let chunk = envelope.as_data().unwrap();
        assert!(chunk.compressed);
        assert!(verify_data_crc(chunk));
        assert_eq!(extract_chunk_bytes(chunk).unwrap(), vec![b'z'; 64]);
    }

    #[test]
    fn fixture_footer() {
        let envelope = roundtrip_test("footer.json");
        let summary = &envelope.as_footer().unwrap().summary;
        assert_eq!(summary.total_chunks, 2);
        assert_eq!(summary.total_size, 12);
    }

    // --- Encoder output pinned against fixtures ---

    #[test]
    fn packetizer_matches_fixtures() {
        let envelopes = create_transfer_package(
            b"hello world\n",
            &FileMeta::new("hello.txt", "text/plain"),
            &TransferOptions {
                chunk_size: 8,
                compress_chunks: false,
            },
        )
        .unwrap();
        assert_eq!(envelopes.len(), 4);

        let produced: Vec<serde_json::Value> = envelopes
            .iter()
            .map(|e| serde_json::from_str(&encode_envelope(e).unwrap()).unwrap())
            .collect();

        let mut header = load_fixture("header.json");
        header["timestamp"] = produced[0]["timestamp"].clone();
        assert_eq!(produced[0], header);

        assert_eq!(produced[1], load_fixture("data.json"));

        let mut footer = load_fixture("footer.json");
        footer["timestamp"] = produced[3]["timestamp"].clone();
        assert_eq!(produced[3], footer);
    }

    // --- Decode errors ---

    #[test]
    fn missing_field_is_structural() {
        assert_eq!(
            decode_code("data.json", |v| {
                v.as_object_mut().unwrap().remove("crc32");
            }),
            "STRUCTURAL_INVALID"
        );
        assert_eq!(
            decode_code("header.json", |v| {
                v["fileInfo"].as_object_mut().unwrap().remove("sha256");
            }),
            "STRUCTURAL_INVALID"
        );
    }

    #[test]
    fn other_version_is_rejected() {
        assert_eq!(
            decode_code("footer.json", |v| v["version"] = "2.0".into()),
            "VERSION_MISMATCH"
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            decode_code("footer.json", |v| v["type"] = "FILE_TRAILER".into()),
            "UNKNOWN_TYPE"
        );
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        assert_eq!(
            decode_code("data.json", |v| v["index"] = "zero".into()),
            "MALFORMED"
        );
    }

    // --- Whole transfer ---

    #[test]
    fn fixture_transfer_reassembles() {
        let mut session = TransferSession::new();
        for line in read_fixture("transfer.jsonl").lines() {
            session.add_text(line);
        }
        assert!(session.is_complete());

        let file = session.finish().unwrap();
        assert_eq!(file.file_name, "hello.txt");
        assert_eq!(file.file_type, "text/plain");
        assert_eq!(file.data, b"hello world\n");
    }
}
