//! Black-box geo index tests: loads a small `geo-index.json` fixture the
//! way `RequestContext::geo_index` does, and exercises proximity search
//! and the bucket-statistics accessors `geo_index_stats` relies on.

use wikikb::geo::GeoIndex;

fn fixture() -> Vec<u8> {
    serde_json::json!({
        "version": 1,
        "entries": [
            {
                "id": "Q1", "lat": 37.7749, "lng": -122.4194,
                "title": "San Francisco", "category": "place",
                "location": {"file_path": "wiki/articles/place.parquet", "row_group": 0, "row": 0},
                "geohash": "9q8yyk"
            },
            {
                "id": "Q2", "lat": 37.8044, "lng": -122.2712,
                "title": "Oakland", "category": "place",
                "location": {"file_path": "wiki/articles/place.parquet", "row_group": 0, "row": 1},
                "geohash": "9q9p1x"
            },
            {
                "id": "Q3", "lat": 51.5074, "lng": -0.1278,
                "title": "London", "category": "place",
                "location": {"file_path": "wiki/articles/place.parquet", "row_group": 0, "row": 2},
                "geohash": "gcpvj0"
            }
        ],
        "buckets": {
            "9q8yyk": ["Q1"],
            "9q9p1x": ["Q2"],
            "gcpvj0": ["Q3"]
        }
    })
    .to_string()
    .into_bytes()
}

#[test]
fn radius_search_finds_nearby_entries_and_excludes_far_ones() {
    let index = GeoIndex::from_json(&fixture()).unwrap();
    assert_eq!(index.len(), 3);

    // San Francisco <-> Oakland is ~13km; London is ~8600km away.
    let hits = index.radius_search(37.7749, -122.4194, 20_000.0, 10, None);
    let ids: Vec<&str> = hits.iter().map(|(e, _)| e.id.as_str()).collect();
    assert!(ids.contains(&"Q1"));
    assert!(ids.contains(&"Q2"));
    assert!(!ids.contains(&"Q3"));
}

#[test]
fn radius_search_respects_category_filter() {
    let index = GeoIndex::from_json(&fixture()).unwrap();
    let hits = index.radius_search(37.7749, -122.4194, 20_000.0, 10, Some("person"));
    assert!(hits.is_empty());
}

#[test]
fn radius_search_orders_by_ascending_distance() {
    let index = GeoIndex::from_json(&fixture()).unwrap();
    let hits = index.radius_search(37.7749, -122.4194, 20_000.0, 10, None);
    assert_eq!(hits[0].0.id, "Q1");
    assert!(hits[0].1 <= hits[1].1);
}

#[test]
fn bucket_stats_match_loaded_fixture() {
    let index = GeoIndex::from_json(&fixture()).unwrap();
    assert_eq!(index.bucket_count(), 3);
    let populations = index.bucket_populations();
    assert_eq!(populations.len(), 3);
    assert!(populations.iter().all(|&p| p == 1));
}

#[test]
fn malformed_json_is_corrupt_error() {
    let err = GeoIndex::from_json(b"not json").unwrap_err();
    assert_eq!(err.kind(), wikikb::error::KbErrorKind::Corrupt);
}
