//! Shared helpers for the integration suite.

use std::sync::Arc;

use async_trait::async_trait;
use hivemind::adapters::migrations::run_migrations;
use hivemind::adapters::sqlite::{create_test_pool, SqliteAdapter};
use hivemind::domain::models::EMBEDDING_DIM;
use hivemind::domain::ports::embedder::{Embedder, EmbedderHealth};
use hivemind::domain::CoreResult;
use hivemind::services::EventStore;

/// In-memory database with the full schema applied.
#[allow(dead_code)]
pub async fn setup_store() -> EventStore {
    let adapter = SqliteAdapter::new(create_test_pool().await.expect("test pool"));
    run_migrations(&adapter).await.expect("migrations");
    EventStore::new(Arc::new(adapter))
}

/// On-disk database under a temp dir, for tests that reopen files.
#[allow(dead_code)]
pub async fn setup_store_at(path: &std::path::Path) -> EventStore {
    let url = format!("sqlite://{}", path.display());
    let pool = hivemind::adapters::sqlite::create_pool(&url, None).await.expect("pool");
    let adapter = SqliteAdapter::new(pool);
    run_migrations(&adapter).await.expect("migrations");
    EventStore::new(Arc::new(adapter))
}

/// Deterministic embedder: hashes words into a sparse 1024-D vector so
/// texts sharing words land near each other, with no external service.
#[allow(dead_code)]
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut vector = vec![0.0_f32; EMBEDDING_DIM];
        for word in text.to_lowercase().split_whitespace() {
            let mut hash = 5381_usize;
            for byte in word.bytes() {
                hash = hash.wrapping_mul(33).wrapping_add(byte as usize);
            }
            vector[hash % EMBEDDING_DIM] += 1.0;
        }
        Ok(vector)
    }

    async fn health_check(&self) -> CoreResult<EmbedderHealth> {
        Ok(EmbedderHealth { ok: true, model: "hash-test".into() })
    }
}
