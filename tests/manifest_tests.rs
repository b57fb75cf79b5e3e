//! Manifest + index loading against an in-memory object store, matching the
//! path-layout rules of §6: `articles/manifest.json` under `DATA_ROOT`,
//! `titles.json`/`ids.json`/`types.json` under `INDEX_ROOT`.

use std::sync::Arc;
use std::time::Duration;

use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde_json::json;

use wikikb::error::KbErrorKind;
use wikikb::manifest::ManifestReader;

async fn put(store: &Arc<dyn ObjectStore>, path: &str, body: serde_json::Value) {
    let bytes = serde_json::to_vec(&body).unwrap();
    store
        .put(&ObjectPath::from(path), PutPayload::from_bytes(bytes::Bytes::from(bytes)))
        .await
        .unwrap();
}

async fn seeded_store() -> Arc<dyn ObjectStore> {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());

    put(
        &store,
        "wiki/articles/manifest.json",
        json!({
            "total_article_count": 2,
            "category_counts": {"person": 1, "place": 1},
            "files": [
                {"path": "wiki/articles/person.parquet", "byte_size": 1000, "row_count": 1, "row_group_count": 1},
                {"path": "wiki/articles/place.parquet", "byte_size": 1000, "row_count": 1, "row_group_count": 1}
            ]
        }),
    )
    .await;

    put(
        &store,
        "wiki/indexes/titles.json",
        json!({
            "ada lovelace": {"file_path": "wiki/articles/person.parquet", "row_group": 0, "row": 0}
        }),
    )
    .await;

    put(
        &store,
        "wiki/indexes/ids.json",
        json!({
            "Q1": {
                "location": {"file_path": "wiki/articles/person.parquet", "row_group": 0, "row": 0},
                "category": "person"
            }
        }),
    )
    .await;

    put(
        &store,
        "wiki/indexes/types.json",
        json!({
            "person": ["wiki/articles/person.parquet"],
            "place": ["wiki/articles/place.parquet"]
        }),
    )
    .await;

    store
}

#[tokio::test]
async fn loads_manifest_and_all_three_indexes_from_their_own_roots() {
    let store = seeded_store().await;
    let reader = ManifestReader::load(store, "wiki", "wiki/indexes", Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(reader.manifest().total_article_count, 2);
    assert_eq!(reader.manifest().category_counts["person"], 1);
    assert_eq!(reader.files_for_type("person"), ["wiki/articles/person.parquet"]);
    assert!(reader.files_for_type("nonexistent").is_empty());
}

#[tokio::test]
async fn title_lookup_normalizes_before_probing_the_index() {
    let store = seeded_store().await;
    let reader = ManifestReader::load(store, "wiki", "wiki/indexes", Duration::from_secs(5))
        .await
        .unwrap();

    let found = reader.lookup_title("Ada_Lovelace").unwrap();
    assert_eq!(found.file_path, "wiki/articles/person.parquet");
    assert!(reader.lookup_title("Nobody Here").is_none());
}

#[tokio::test]
async fn id_lookup_returns_location_and_category() {
    let store = seeded_store().await;
    let reader = ManifestReader::load(store, "wiki", "wiki/indexes", Duration::from_secs(5))
        .await
        .unwrap();

    let entry = reader.lookup_id("Q1").unwrap();
    assert_eq!(entry.category, "person");
    assert_eq!(entry.location.row, 0);
}

#[tokio::test]
async fn falls_back_to_backup_manifest_when_primary_is_missing() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    put(
        &store,
        "wiki/articles/manifest.backup.json",
        json!({"total_article_count": 1, "category_counts": {"person": 1}, "files": []}),
    )
    .await;
    put(&store, "wiki/indexes/titles.json", json!({})).await;
    put(&store, "wiki/indexes/ids.json", json!({})).await;
    put(&store, "wiki/indexes/types.json", json!({})).await;

    let reader = ManifestReader::load(store, "wiki", "wiki/indexes", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(reader.manifest().total_article_count, 1);
}

#[tokio::test]
async fn missing_manifest_at_both_paths_is_not_found() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let err = ManifestReader::load(store, "wiki", "wiki/indexes", Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), KbErrorKind::NotFound);
}
