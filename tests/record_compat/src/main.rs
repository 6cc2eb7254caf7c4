fn main() {
    println!("Run `cargo test -p record-compat` to execute record compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use blockput_protocol::{ProgressEvent, ProgressRecord, UploadResponse};
    use blockput_transfer::ProgressStore;

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    ///
    /// Progress fractions like `1` and `1.0` are the same value.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
    }

    fn parse_record(name: &str) -> ProgressRecord {
        serde_json::from_value(load_fixture(name))
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"))
    }

    // --- Records written by this crate ---

    #[test]
    fn fixture_progress_record() {
        roundtrip_test::<ProgressRecord>("progress_record.json");
    }

    #[test]
    fn progress_record_slots() {
        let record = parse_record("progress_record.json");
        assert_eq!(record.block_count(), 3);
        assert_eq!(record.filled(), 1);
        assert_eq!(record.get(0).unwrap().offset, 4 * 1024 * 1024);
        assert_eq!(record.get(0).unwrap().host, "file:///srv/bucket");
    }

    // --- Records written by older clients ---

    #[test]
    fn legacy_zero_value_slots_are_unset() {
        let record = parse_record("legacy_record_partial.json");
        assert_eq!(record.block_count(), 3);
        assert!(record.get(0).is_none());
        assert!(record.get(2).is_none());

        let block = record.get(1).unwrap();
        assert_eq!(block.ctx, "mZz0kCeDBZ1QPOoXl3lN2AfAjsMEAAAA_block1");
        assert_eq!(block.crc32, 2_386_711_374);
        assert_eq!(block.offset, 4_194_304);
        assert_eq!(block.expired_at, 1_893_456_000);
    }

    #[test]
    fn legacy_complete_record() {
        let record = parse_record("legacy_record_complete.json");
        assert_eq!(record.block_count(), 2);
        assert_eq!(record.filled(), 2);
        assert_eq!(record.get(1).unwrap().offset, 1_611_392);
    }

    #[test]
    fn legacy_null_progresses() {
        let record = parse_record("legacy_record_null.json");
        assert_eq!(record.block_count(), 0);
    }

    #[test]
    fn legacy_record_rewrites_unset_slots_as_null() {
        let record = parse_record("legacy_record_partial.json");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["progresses"][0].is_null());
        assert!(json["progresses"][2].is_null());
        assert_eq!(json["progresses"][1]["offset"], 4_194_304);
    }

    #[test]
    fn store_loads_legacy_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(tmp.path());
        fs::copy(
            fixtures_dir().join("legacy_record_partial.json"),
            store.record_path("abc"),
        )
        .unwrap();

        let loaded = store.load("abc").unwrap();
        assert_eq!(loaded, parse_record("legacy_record_partial.json"));

        // A stored context one second before `expired_at` is stale.
        let stale = ProgressStore::validate(loaded.clone(), 3, 1_893_455_999, |r, now| {
            now > r.expired_at - 24 * 3600
        });
        assert_eq!(stale, ProgressRecord::empty(3));

        let fresh = ProgressStore::validate(loaded, 3, 1_700_000_000, |r, now| {
            now > r.expired_at - 24 * 3600
        });
        assert_eq!(fresh.filled(), 1);
    }

    // --- Host-facing replies ---

    #[test]
    fn fixture_upload_response_success() {
        roundtrip_test::<UploadResponse>("upload_response_success.json");
    }

    #[test]
    fn fixture_upload_response_failure() {
        roundtrip_test::<UploadResponse>("upload_response_failure.json");
        let response: UploadResponse =
            serde_json::from_value(load_fixture("upload_response_failure.json")).unwrap();
        assert!(!response.success);
        assert!(response.result.is_none());
        assert!(response.partial.is_none());
    }

    #[test]
    fn fixture_upload_response_cancelled() {
        roundtrip_test::<UploadResponse>("upload_response_cancelled.json");
        let response: UploadResponse =
            serde_json::from_value(load_fixture("upload_response_cancelled.json")).unwrap();
        let partial = response.partial.unwrap();
        assert_eq!(partial.completed_blocks, 1);
        assert_eq!(partial.block_count, 3);
    }

    #[test]
    fn fixture_progress_events() {
        roundtrip_test::<Vec<ProgressEvent>>("progress_events.json");
        let events: Vec<ProgressEvent> =
            serde_json::from_value(load_fixture("progress_events.json")).unwrap();
        assert_eq!(events.last(), Some(&ProgressEvent::EndOfStream));
    }
}
