//! Semantic memory acceptance tests: similarity ranking, FTS fallback,
//! confidence bounds, and the one-shot legacy import.

mod common;

use std::sync::Arc;

use hivemind::domain::models::MatchType;
use hivemind::domain::ports::embedder::NullEmbedder;
use hivemind::domain::ports::storage::embedding_to_blob;
use hivemind::services::memory::{reset_migration_check, FindOptions, StoreOptions};
use hivemind::services::MemoryService;

use common::HashEmbedder;

async fn memory_service() -> MemoryService {
    MemoryService::new(common::setup_store().await, Arc::new(HashEmbedder), "p")
}

#[tokio::test]
async fn find_ranks_related_content_higher() {
    let svc = memory_service().await;

    svc.store("OAuth refresh tokens need buffer", StoreOptions::default()).await.unwrap();
    svc.store("Cooking recipes for pasta", StoreOptions::default()).await.unwrap();

    let results = svc
        .find("token refresh", FindOptions { threshold: 0.0, ..Default::default() })
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results[0].memory.content.contains("OAuth"));
    assert!(results.iter().all(|r| r.match_type == MatchType::Vector));
    for window in results.windows(2) {
        assert!(window[0].score >= window[1].score, "scores must descend");
    }
    if results.len() == 2 {
        assert!(results[0].score > results[1].score);
    }
}

#[tokio::test]
async fn confidence_is_bounded_and_modulates_decay() {
    let svc = memory_service().await;

    for bad in [-0.1, 1.1, f64::NAN] {
        let err = svc
            .store("x", StoreOptions { confidence: bad, ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, hivemind::ErrorKind::Invalid);
    }

    let entry = svc
        .store("solid fact", StoreOptions { confidence: 1.0, ..Default::default() })
        .await
        .unwrap();
    let stored = svc.get(&entry.id).await.unwrap();
    assert!((0.0..=1.0).contains(&stored.confidence));
    assert!((stored.half_life_days() - 135.0).abs() < 1e-9);
}

#[tokio::test]
async fn embedder_outage_falls_back_to_fts() {
    let store = common::setup_store().await;
    let healthy = MemoryService::new(store.clone(), Arc::new(HashEmbedder), "p");
    healthy.store("retry with exponential backoff", StoreOptions::default()).await.unwrap();

    let degraded = MemoryService::new(store, Arc::new(NullEmbedder), "p");
    let results = degraded.find("exponential backoff", FindOptions::default()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].match_type, MatchType::Fts);

    // Storing without an embedder is a distinguishable failure.
    let err = degraded.store("new fact", StoreOptions::default()).await.unwrap_err();
    assert_eq!(err.kind, hivemind::ErrorKind::Unavailable);
}

#[tokio::test]
async fn validation_resets_decay_clock() {
    let svc = memory_service().await;
    let entry = svc.store("validated fact", StoreOptions::default()).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    svc.validate(&entry.id).await.unwrap();

    let after = svc.get(&entry.id).await.unwrap();
    assert!(after.created_at > entry.created_at);
}

#[tokio::test]
async fn legacy_import_runs_once_into_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let legacy_path = dir.path().join("legacy.db");

    // Build a legacy database with one embedded memory.
    {
        let url = format!("sqlite://{}", legacy_path.display());
        let pool = hivemind::adapters::sqlite::create_pool(&url, None).await.unwrap();
        sqlx::query(
            "CREATE TABLE memories (id TEXT PRIMARY KEY, content TEXT NOT NULL,
             metadata TEXT, embedding BLOB)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO memories (id, content, metadata, embedding) VALUES (?, ?, ?, ?)")
            .bind("mem_legacy01")
            .bind("legacy wisdom")
            .bind(r#"{"source":"v1"}"#)
            .bind(embedding_to_blob(&vec![0.5_f32; 1024]))
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    reset_migration_check();
    let svc = memory_service().await;
    svc.maybe_import_legacy(&legacy_path).await;

    let imported = svc.get("mem_legacy01").await.unwrap();
    assert_eq!(imported.content, "legacy wisdom");
    assert_eq!(imported.metadata["source"], "v1");
    let stats = svc.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.embedded, 1);

    // The process-wide flag suppresses a second import attempt.
    let second = memory_service().await;
    second.maybe_import_legacy(&legacy_path).await;
    assert_eq!(second.stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn list_and_collections() {
    let svc = memory_service().await;
    svc.store("a", StoreOptions::default()).await.unwrap();
    svc.store("b", StoreOptions { collection: "conventions".into(), ..Default::default() })
        .await
        .unwrap();

    assert_eq!(svc.list(None).await.unwrap().len(), 2);
    let scoped = svc.list(Some("conventions")).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].content, "b");
}
