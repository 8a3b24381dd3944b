//! The aggregator over the filesystem image store.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;

use domains::{BlobStore, Document, LISTINGS, USERS};
use services::{Aggregator, AggregatorMetrics, AggregatorSettings, ListingService};
use storage_adapters::local::LocalBlobStore;
use storage_adapters::{DocumentDirectory, MemoryDataStore};

fn scratch_root() -> PathBuf {
    std::env::temp_dir().join(format!("trading-post-it-{}", Uuid::new_v4().simple()))
}

fn put(store: &MemoryDataStore, collection: &str, id: &str, value: serde_json::Value) {
    if let serde_json::Value::Object(fields) = value {
        store.put(collection, Document::new(id, fields));
    }
}

#[tokio::test]
async fn oversized_files_are_omitted_and_counted() {
    let root = scratch_root();
    let blobs = Arc::new(LocalBlobStore::new(root.clone(), 8));
    let store = Arc::new(MemoryDataStore::new());
    put(&store, USERS, "u1", json!({ "display_name": "Alice" }));
    put(
        &store,
        LISTINGS,
        "p1",
        json!({
            "title": "Bronto",
            "body": "Berry gatherer",
            "post_type": "For Sale",
            "server_type": "Official PvE",
            "platform": "PC",
            "price": "500 poly",
            "created": 1,
            "user_id": "u1",
            "fulfilled_by": "",
            "status": "active",
            "comment_count": 0,
            "image_count": 2,
        }),
    );
    blobs.put_image("p1", 1, Bytes::from_static(b"small")).await.unwrap();
    blobs
        .put_image("p1", 2, Bytes::from_static(b"far too large"))
        .await
        .unwrap();

    let aggregator = Aggregator::new(
        store.clone(),
        blobs,
        Arc::new(DocumentDirectory::new(store)),
        AggregatorSettings::default(),
        AggregatorMetrics::new(),
    );
    let agg = aggregator.resolve_by_id("p1").await.unwrap();

    assert_eq!(agg.images.len(), 1);
    assert_eq!(&agg.images[0].data[..], b"small");
    assert_eq!(aggregator.metrics().image_fetch_failures("size_exceeded"), 1);

    let _ = std::fs::remove_dir_all(root);
}

#[tokio::test]
async fn deleting_a_listing_removes_its_image_directory() {
    let root = scratch_root();
    let blobs = Arc::new(LocalBlobStore::new(root.clone(), 1024));
    let store = Arc::new(MemoryDataStore::new());
    put(&store, USERS, "u1", json!({ "display_name": "Alice" }));
    let directory = Arc::new(DocumentDirectory::new(store.clone()));
    let listings = ListingService::new(store, blobs.clone(), directory);

    let record = listings
        .create_listing(
            "u1",
            domains::ListingDraft {
                title: "Quetz".into(),
                body: "Platform saddle included".into(),
                platform: domains::Platform::Pc,
                server_type: domains::ServerType::OfficialPvp,
                listing_type: domains::ListingType::ForSale,
                price: "2k metal".into(),
            },
            vec![Bytes::from_static(b"img")],
        )
        .await
        .unwrap();
    assert!(root.join(&record.id).join("1.png").exists());

    listings.delete_listing(&record.id).await.unwrap();
    assert!(!root.join(&record.id).exists());

    let _ = std::fs::remove_dir_all(root);
}
