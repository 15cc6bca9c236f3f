//! Semantic memory: content plus 1024-D embeddings with cosine search, FTS
//! fallback, and confidence-weighted decay applied at ranking time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult, ErrorKind};
use crate::domain::models::{
    generate_memory_id, validate_confidence, validate_embedding, EventPayload, MatchType,
    MemoryEntry, MemorySearchResult, NewEvent, DEFAULT_CONFIDENCE,
};
use crate::domain::ports::embedder::Embedder;
use crate::domain::ports::storage::{with_tx, SqlRow, SqlValue, StorageAdapter};
use crate::services::event_store::EventStore;

/// Default byte cap for unexpanded search-result previews.
pub const DEFAULT_PREVIEW_BYTES: usize = 200;

/// Process-wide guard so the legacy import runs at most once per process,
/// no matter how many adapters are constructed.
static LEGACY_IMPORT_CHECKED: AtomicBool = AtomicBool::new(false);

/// Test hook: allow the legacy-import check to run again.
pub fn reset_migration_check() {
    LEGACY_IMPORT_CHECKED.store(false, Ordering::SeqCst);
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub tags: Vec<String>,
    pub metadata: Option<serde_json::Value>,
    pub collection: String,
    pub confidence: f64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            metadata: None,
            collection: "default".to_string(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FindOptions {
    pub limit: usize,
    pub threshold: f64,
    pub collection: Option<String>,
    pub expand: bool,
    pub fts: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self { limit: 10, threshold: 0.3, collection: None, expand: false, fts: false }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryStats {
    pub total: i64,
    pub embedded: i64,
    pub by_collection: Vec<(String, i64)>,
}

/// Memory operations over one project's database.
#[derive(Clone)]
pub struct MemoryService {
    store: EventStore,
    embedder: Arc<dyn Embedder>,
    project_key: String,
    preview_bytes: usize,
}

impl MemoryService {
    pub fn new(store: EventStore, embedder: Arc<dyn Embedder>, project_key: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            project_key: project_key.into(),
            preview_bytes: DEFAULT_PREVIEW_BYTES,
        }
    }

    fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        self.store.adapter()
    }

    /// Store content with its embedding in one transaction. Fails with
    /// `Unavailable` when the embedder is down.
    pub async fn store(&self, content: &str, options: StoreOptions) -> CoreResult<MemoryEntry> {
        if content.trim().is_empty() {
            return Err(CoreError::invalid("memory content must not be empty"));
        }
        let confidence = validate_confidence(options.confidence)?;

        let embedding = self.embedder.embed(content).await?;
        validate_embedding(&embedding)?;

        let mut metadata = options.metadata.unwrap_or_else(|| serde_json::json!({}));
        if !options.tags.is_empty() {
            metadata["tags"] = serde_json::json!(options.tags);
        }

        let memory_id = generate_memory_id();
        let event = NewEvent::new(
            self.project_key.as_str(),
            EventPayload::MemoryStored {
                memory_id: memory_id.clone(),
                content: content.to_string(),
                metadata: metadata.clone(),
                collection: options.collection.clone(),
                confidence,
            },
        );

        let store = self.store.clone();
        let id_for_tx = memory_id.clone();
        let event_time = with_tx(self.adapter().as_ref(), move |tx| {
            Box::pin(async move {
                let appended = store.append_in_tx(tx, event).await?;
                tx.insert_embedding(&id_for_tx, &embedding).await?;
                Ok(appended.timestamp_ms)
            })
        })
        .await?;

        Ok(MemoryEntry {
            id: memory_id,
            content: content.to_string(),
            metadata,
            collection: options.collection,
            created_at: crate::domain::models::ms_to_datetime(event_time),
            confidence,
        })
    }

    /// Search memories. Vector search by default; FTS when requested or
    /// when the embedder is unreachable.
    pub async fn find(
        &self,
        query: &str,
        options: FindOptions,
    ) -> CoreResult<Vec<MemorySearchResult>> {
        if options.fts {
            return self.find_fts(query, &options).await;
        }

        match self.embedder.embed(query).await {
            Ok(embedding) => {
                validate_embedding(&embedding)?;
                self.find_vector(&embedding, &options).await
            }
            Err(err) if err.kind == ErrorKind::Unavailable => {
                tracing::warn!("embedder unavailable, falling back to full-text search");
                self.find_fts(query, &options).await
            }
            Err(err) => Err(err),
        }
    }

    async fn find_vector(
        &self,
        embedding: &[f32],
        options: &FindOptions,
    ) -> CoreResult<Vec<MemorySearchResult>> {
        // Over-fetch so collection filtering and decay reordering cannot
        // starve the requested limit.
        let fetch = u32::try_from((options.limit.max(1)) * 4).unwrap_or(u32::MAX);
        let hits = self.adapter().vector_search(embedding, fetch).await?;
        let retained: Vec<(String, f64)> = hits
            .into_iter()
            .filter(|hit| hit.similarity >= options.threshold)
            .map(|hit| (hit.memory_id, hit.similarity))
            .collect();

        self.rank_results(retained, options, MatchType::Vector).await
    }

    async fn find_fts(
        &self,
        query: &str,
        options: &FindOptions,
    ) -> CoreResult<Vec<MemorySearchResult>> {
        let fetch = u32::try_from((options.limit.max(1)) * 4).unwrap_or(u32::MAX);
        let hits = self.adapter().fts_search(query, fetch).await?;
        let scored: Vec<(String, f64)> =
            hits.into_iter().map(|hit| (hit.memory_id, hit.score)).collect();

        self.rank_results(scored, options, MatchType::Fts).await
    }

    async fn rank_results(
        &self,
        scored_ids: Vec<(String, f64)>,
        options: &FindOptions,
        match_type: MatchType,
    ) -> CoreResult<Vec<MemorySearchResult>> {
        if scored_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = scored_ids.iter().map(|(id, _)| id.as_str()).collect();
        let placeholders = vec!["?"; ids.len()].join(", ");
        let params: Vec<SqlValue> = ids.iter().map(|id| SqlValue::from(*id)).collect();
        let rows = self
            .adapter()
            .query(
                &format!(
                    "SELECT id, content, metadata, collection, created_at, confidence
                     FROM memories WHERE id IN ({placeholders})"
                ),
                &params,
            )
            .await?;

        let now = chrono::Utc::now();
        let mut results = Vec::with_capacity(rows.len());
        for (id, raw_score) in &scored_ids {
            let Some(row) = rows.iter().find(|row| {
                row.text("id").is_ok_and(|row_id| row_id == *id)
            }) else {
                continue;
            };
            let mut memory = row_to_memory(row)?;
            if let Some(collection) = &options.collection {
                if memory.collection != *collection {
                    continue;
                }
            }
            // Decay is a ranking-time adjustment only.
            let score = raw_score * memory.decay_factor(now);
            if !options.expand {
                memory.content = memory.preview(self.preview_bytes);
            }
            results.push(MemorySearchResult { memory, score, match_type });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(options.limit);
        Ok(results)
    }

    pub async fn get(&self, id: &str) -> CoreResult<MemoryEntry> {
        let rows = self
            .adapter()
            .query(
                "SELECT id, content, metadata, collection, created_at, confidence
                 FROM memories WHERE id = ?",
                &[SqlValue::from(id)],
            )
            .await?;
        rows.first()
            .map(row_to_memory)
            .transpose()?
            .ok_or_else(|| CoreError::not_found(format!("memory {id} not found")))
    }

    /// Remove a memory. The projection delete cascades to the embedding row
    /// and the FTS shadow.
    pub async fn remove(&self, id: &str) -> CoreResult<()> {
        self.get(id).await?;
        self.store
            .append(NewEvent::new(
                self.project_key.as_str(),
                EventPayload::MemoryRemoved { memory_id: id.to_string() },
            ))
            .await?;
        Ok(())
    }

    pub async fn list(&self, collection: Option<&str>) -> CoreResult<Vec<MemoryEntry>> {
        let (sql, params) = match collection {
            Some(collection) => (
                "SELECT id, content, metadata, collection, created_at, confidence
                 FROM memories WHERE collection = ? ORDER BY created_at DESC",
                vec![SqlValue::from(collection)],
            ),
            None => (
                "SELECT id, content, metadata, collection, created_at, confidence
                 FROM memories ORDER BY created_at DESC",
                Vec::new(),
            ),
        };
        let rows = self.adapter().query(sql, &params).await?;
        rows.iter().map(row_to_memory).collect()
    }

    pub async fn stats(&self) -> CoreResult<MemoryStats> {
        let total = self
            .adapter()
            .query("SELECT COUNT(*) AS n FROM memories", &[])
            .await?
            .first()
            .map_or(Ok(0), |row| row.integer("n"))?;
        let embedded = self
            .adapter()
            .query("SELECT COUNT(*) AS n FROM memory_embeddings", &[])
            .await?
            .first()
            .map_or(Ok(0), |row| row.integer("n"))?;
        let rows = self
            .adapter()
            .query(
                "SELECT collection, COUNT(*) AS n FROM memories
                 GROUP BY collection ORDER BY collection",
                &[],
            )
            .await?;
        let by_collection = rows
            .iter()
            .map(|row| Ok((row.text("collection")?, row.integer("n")?)))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(MemoryStats { total, embedded, by_collection })
    }

    /// Reset the decay clock for a memory; fails when the id is unknown.
    pub async fn validate(&self, id: &str) -> CoreResult<()> {
        self.get(id).await?;
        self.store
            .append(NewEvent::new(
                self.project_key.as_str(),
                EventPayload::MemoryValidated { memory_id: id.to_string() },
            ))
            .await?;
        Ok(())
    }

    /// One-shot legacy import: when a pre-event-sourcing database exists
    /// and this store is empty, copy its rows over in one transaction.
    /// Errors are logged and swallowed; the service continues empty.
    pub async fn maybe_import_legacy(&self, legacy_path: &std::path::Path) {
        if LEGACY_IMPORT_CHECKED.swap(true, Ordering::SeqCst) {
            return;
        }
        if !legacy_path.exists() {
            return;
        }
        match self.import_legacy(legacy_path).await {
            Ok(0) => {}
            Ok(imported) => {
                tracing::info!(imported, path = %legacy_path.display(), "imported legacy memories");
            }
            Err(err) => {
                tracing::warn!(error = %err, path = %legacy_path.display(), "legacy memory import failed; continuing with an empty store");
            }
        }
    }

    async fn import_legacy(&self, legacy_path: &std::path::Path) -> CoreResult<u64> {
        let existing = self
            .adapter()
            .query("SELECT COUNT(*) AS n FROM memories", &[])
            .await?
            .first()
            .map_or(Ok(0), |row| row.integer("n"))?;
        if existing > 0 {
            return Ok(0);
        }

        let url = format!("sqlite://{}?mode=ro", legacy_path.display());
        let legacy_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|e| CoreError::unavailable(format!("failed to open legacy database: {e}")))?;

        use sqlx::Row as _;
        let rows = sqlx::query("SELECT id, content, metadata, embedding FROM memories")
            .fetch_all(&legacy_pool)
            .await
            .map_err(|e| CoreError::unavailable(format!("failed to read legacy rows: {e}")))?;
        legacy_pool.close().await;

        let mut imported = 0;
        let store = self.store.clone();
        let project = self.project_key.clone();
        let entries: Vec<(String, String, Option<String>, Option<Vec<u8>>)> = rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("id")?,
                    row.try_get::<String, _>("content")?,
                    row.try_get::<Option<String>, _>("metadata")?,
                    row.try_get::<Option<Vec<u8>>, _>("embedding")?,
                ))
            })
            .collect::<Result<_, sqlx::Error>>()?;

        with_tx(self.adapter().as_ref(), move |tx| {
            Box::pin(async move {
                for (id, content, metadata, embedding) in entries {
                    let metadata: serde_json::Value = metadata
                        .as_deref()
                        .and_then(|raw| serde_json::from_str(raw).ok())
                        .unwrap_or_else(|| serde_json::json!({}));
                    store
                        .append_in_tx(
                            tx,
                            NewEvent::new(
                                project.as_str(),
                                EventPayload::MemoryStored {
                                    memory_id: id.clone(),
                                    content,
                                    metadata,
                                    collection: "default".to_string(),
                                    confidence: DEFAULT_CONFIDENCE,
                                },
                            ),
                        )
                        .await?;
                    if let Some(blob) = embedding {
                        let vector =
                            crate::domain::ports::storage::blob_to_embedding(&blob)?;
                        if validate_embedding(&vector).is_ok() {
                            tx.insert_embedding(&id, &vector).await?;
                        }
                    }
                    imported += 1;
                }
                Ok(imported)
            })
        })
        .await
    }
}

fn row_to_memory(row: &SqlRow) -> CoreResult<MemoryEntry> {
    Ok(MemoryEntry {
        id: row.text("id")?,
        content: row.text("content")?,
        metadata: row.json("metadata")?,
        collection: row.text("collection")?,
        created_at: row.datetime("created_at")?,
        confidence: row.real("confidence")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::migrations::run_migrations;
    use crate::adapters::sqlite::{connection::create_test_pool, SqliteAdapter};
    use crate::domain::models::EMBEDDING_DIM;
    use crate::domain::ports::embedder::{EmbedderHealth, NullEmbedder};
    use async_trait::async_trait;

    /// Deterministic fake: hashes words into a sparse vector so related
    /// texts land near each other.
    struct HashEmbedder;

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

    async fn service_with(embedder: Arc<dyn Embedder>) -> MemoryService {
        let adapter = SqliteAdapter::new(create_test_pool().await.unwrap());
        run_migrations(&adapter).await.unwrap();
        MemoryService::new(EventStore::new(Arc::new(adapter)), embedder, "p")
    }

    async fn service() -> MemoryService {
        service_with(Arc::new(HashEmbedder)).await
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let svc = service().await;
        let entry = svc
            .store("OAuth refresh tokens need a buffer", StoreOptions::default())
            .await
            .unwrap();
        assert!(entry.id.starts_with("mem_"));

        let fetched = svc.get(&entry.id).await.unwrap();
        assert_eq!(fetched.content, "OAuth refresh tokens need a buffer");
        assert!((fetched.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_store_rejects_bad_confidence() {
        let svc = service().await;
        let err = svc
            .store("x", StoreOptions { confidence: 1.5, ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_store_without_embedder_is_unavailable() {
        let svc = service_with(Arc::new(NullEmbedder)).await;
        let err = svc.store("x", StoreOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_find_ranks_by_similarity() {
        let svc = service().await;
        svc.store("OAuth refresh tokens need buffer", StoreOptions::default())
            .await
            .unwrap();
        svc.store("Cooking recipes for pasta", StoreOptions::default()).await.unwrap();

        let results = svc
            .find("token refresh", FindOptions { threshold: 0.0, ..Default::default() })
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].match_type, MatchType::Vector);
        assert!(results[0].memory.content.contains("OAuth"));
        for window in results.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }

    #[tokio::test]
    async fn test_find_falls_back_to_fts_when_embedder_down() {
        let svc = service().await;
        svc.store("OAuth refresh tokens need buffer", StoreOptions::default())
            .await
            .unwrap();

        // Same database, embedder replaced by one that is down.
        let down = MemoryService::new(svc.store.clone(), Arc::new(NullEmbedder), "p");
        let results = down.find("refresh tokens", FindOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Fts);
    }

    #[tokio::test]
    async fn test_find_fts_explicit() {
        let svc = service().await;
        svc.store("retry with exponential backoff on 429", StoreOptions::default())
            .await
            .unwrap();
        svc.store("pasta carbonara technique", StoreOptions::default()).await.unwrap();

        let results = svc
            .find("exponential backoff", FindOptions { fts: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_type, MatchType::Fts);
        assert!(results[0].memory.content.contains("backoff"));
    }

    #[tokio::test]
    async fn test_collection_filter() {
        let svc = service().await;
        svc.store(
            "project convention: tests live next to code",
            StoreOptions { collection: "conventions".into(), ..Default::default() },
        )
        .await
        .unwrap();
        svc.store("unrelated note about conventions", StoreOptions::default()).await.unwrap();

        let results = svc
            .find(
                "tests conventions",
                FindOptions {
                    collection: Some("conventions".into()),
                    threshold: 0.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.memory.collection == "conventions"));
    }

    #[tokio::test]
    async fn test_expand_controls_preview() {
        let svc = service().await;
        let long = format!("needle {}", "filler ".repeat(100));
        svc.store(&long, StoreOptions::default()).await.unwrap();

        let compact = svc
            .find("needle", FindOptions { threshold: 0.0, ..Default::default() })
            .await
            .unwrap();
        assert!(compact[0].memory.content.len() < long.len());

        let expanded = svc
            .find("needle", FindOptions { threshold: 0.0, expand: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(expanded[0].memory.content, long);
    }

    #[tokio::test]
    async fn test_remove_cascades() {
        let svc = service().await;
        let entry = svc.store("to be removed", StoreOptions::default()).await.unwrap();
        svc.remove(&entry.id).await.unwrap();

        assert_eq!(svc.get(&entry.id).await.unwrap_err().kind, ErrorKind::NotFound);
        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.embedded, 0);

        assert_eq!(svc.remove("mem_missing").await.unwrap_err().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_validate_requires_known_id() {
        let svc = service().await;
        let entry = svc.store("validated fact", StoreOptions::default()).await.unwrap();
        svc.validate(&entry.id).await.unwrap();
        assert_eq!(svc.validate("mem_missing").await.unwrap_err().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_stats_counts_collections() {
        let svc = service().await;
        svc.store("a", StoreOptions::default()).await.unwrap();
        svc.store("b", StoreOptions { collection: "other".into(), ..Default::default() })
            .await
            .unwrap();

        let stats = svc.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.embedded, 2);
        assert_eq!(stats.by_collection.len(), 2);
    }
}
