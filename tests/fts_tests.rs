//! Exercises `load_gzip_json` end-to-end: a built `FtsIndex` is serialized,
//! gzip-compressed, and fed back through the loader the way
//! `RequestContext::fts_index` would hand it bytes straight off the wire.

use std::collections::HashMap;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use wikikb::error::KbErrorKind;
use wikikb::fts::{load_gzip_json, FtsIndex, SearchOptions};

fn gzip_json(index: &FtsIndex) -> Vec<u8> {
    let json = serde_json::to_vec(index).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).unwrap();
    encoder.finish().unwrap()
}

fn fields(title: &str, text: &str) -> HashMap<String, String> {
    [("title".to_string(), title.to_string()), ("text".to_string(), text.to_string())]
        .into_iter()
        .collect()
}

#[test]
fn round_trips_through_gzip_and_preserves_search_ranking() {
    let mut index = FtsIndex::new();
    index.index_document("a", "place", fields("Golden Gate Bridge", "a famous landmark"));
    index.index_document("b", "place", fields("Unrelated", "mentions golden gate bridge in passing"));

    let bytes = gzip_json(&index);
    let loaded = load_gzip_json(&bytes).unwrap();

    assert_eq!(loaded.document_count(), 2);
    let results = loaded.search("golden gate bridge", &SearchOptions::default());
    assert_eq!(results[0].id, "a");
}

#[test]
fn non_gzip_bytes_are_corrupt_error() {
    let err = load_gzip_json(b"definitely not gzip").unwrap_err();
    assert_eq!(err.kind(), KbErrorKind::Corrupt);
}

#[test]
fn gzip_bytes_that_decompress_to_non_json_are_corrupt_error() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(b"not json at all").unwrap();
    let bytes = encoder.finish().unwrap();
    let err = load_gzip_json(&bytes).unwrap_err();
    assert_eq!(err.kind(), KbErrorKind::Corrupt);
}
