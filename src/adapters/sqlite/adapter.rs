//! SQLite implementation of the storage port.
//!
//! SQL arrives in `?`-placeholder form, which is SQLite-native. JSON and
//! timestamps are stored as TEXT; embeddings as little-endian f32 blobs with
//! cosine similarity computed in-process; full-text search through an FTS5
//! shadow table maintained by triggers.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Column, Row, Sqlite, SqlitePool, TypeInfo, ValueRef};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::cosine_similarity;
use crate::domain::ports::storage::{
    blob_to_embedding, embedding_to_blob, BackendKind, FtsHit, SqlRow, SqlValue, StorageAdapter,
    StorageTx, VectorHit,
};

/// SQLite-backed storage adapter.
#[derive(Clone)]
pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Blob(v) => query.bind(v.clone()),
            // Fixed-width millisecond form so TEXT comparison stays
            // chronological.
            SqlValue::Timestamp(v) => {
                query.bind(v.to_rfc3339_opts(chrono::SecondsFormat::Millis, false))
            }
            SqlValue::Json(v) => query.bind(v.to_string()),
        };
    }
    query
}

fn decode_row(row: &SqliteRow) -> CoreResult<SqlRow> {
    let mut entries = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(index)
            .map_err(|e| CoreError::corruption(format!("failed to read column: {e}")))?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
                "BOOLEAN" => SqlValue::Integer(i64::from(row.try_get::<bool, _>(index)?)),
                "REAL" => SqlValue::Real(row.try_get::<f64, _>(index)?),
                "BLOB" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(index)?),
                _ => SqlValue::Text(row.try_get::<String, _>(index)?),
            }
        };
        entries.push((column.name().to_string(), value));
    }
    Ok(SqlRow::new(entries))
}

#[async_trait]
impl StorageAdapter for SqliteAdapter {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> CoreResult<Vec<SqlRow>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> CoreResult<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> CoreResult<Box<dyn StorageTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTx { tx }))
    }

    async fn vector_search(&self, embedding: &[f32], limit: u32) -> CoreResult<Vec<VectorHit>> {
        // No native vector index here: scan blobs and rank in-process.
        let rows = sqlx::query("SELECT memory_id, embedding FROM memory_embeddings")
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let memory_id: String = row.try_get("memory_id")?;
            let blob: Vec<u8> = row.try_get("embedding")?;
            let stored = blob_to_embedding(&blob)?;
            hits.push(VectorHit {
                memory_id,
                similarity: cosine_similarity(embedding, &stored),
            });
        }
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn fts_search(&self, query: &str, limit: u32) -> CoreResult<Vec<FtsHit>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        // FTS5 rank is negative, best first. Negate for a positive
        // descending score.
        let rows = sqlx::query(
            r"SELECT m.id AS memory_id, f.rank AS rank
              FROM memories_fts f
              JOIN memories m ON m.rowid = f.rowid
              WHERE memories_fts MATCH ?
              ORDER BY f.rank
              LIMIT ?",
        )
        .bind(&sanitized)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FtsHit {
                    memory_id: row.try_get("memory_id")?,
                    score: -row.try_get::<f64, _>("rank")?,
                })
            })
            .collect()
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Sqlite
    }
}

struct SqliteTx {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl StorageTx for SqliteTx {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<Vec<SqlRow>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn execute_batch(&mut self, sql: &str) -> CoreResult<()> {
        sqlx::Executor::execute(&mut *self.tx, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn insert_embedding(&mut self, memory_id: &str, embedding: &[f32]) -> CoreResult<()> {
        sqlx::query(
            r"INSERT INTO memory_embeddings (memory_id, embedding) VALUES (?, ?)
              ON CONFLICT(memory_id) DO UPDATE SET embedding = excluded.embedding",
        )
        .bind(memory_id)
        .bind(embedding_to_blob(embedding))
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

/// Quote each whitespace-separated term so user input cannot inject FTS5
/// query syntax.
fn sanitize_fts5_query(query: &str) -> String {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| {
            let escaped = term.replace('"', "\"\"");
            format!("\"{escaped}\"")
        })
        .collect();

    terms.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;

    async fn adapter() -> SqliteAdapter {
        SqliteAdapter::new(create_test_pool().await.unwrap())
    }

    #[test]
    fn test_sanitize_fts5_query() {
        assert_eq!(sanitize_fts5_query("token refresh"), "\"token\" \"refresh\"");
        assert_eq!(sanitize_fts5_query("a\"b"), "\"a\"\"b\"");
        assert_eq!(sanitize_fts5_query("   "), "");
    }

    #[tokio::test]
    async fn test_query_decodes_typed_columns() {
        let db = adapter().await;
        let rows = db
            .query(
                "SELECT 1 AS n, 2.5 AS r, 'hi' AS t, NULL AS missing",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].integer("n").unwrap(), 1);
        assert!((rows[0].real("r").unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(rows[0].text("t").unwrap(), "hi");
        assert_eq!(rows[0].opt_text("missing").unwrap(), None);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_demand() {
        let db = adapter().await;
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::from("x")])
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let rows = db.query("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].integer("n").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_commit_persists() {
        let db = adapter().await;
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[])
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        tx.execute("INSERT INTO t (v) VALUES (?)", &[SqlValue::from("x")])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let rows = db.query("SELECT COUNT(*) AS n FROM t", &[]).await.unwrap();
        assert_eq!(rows[0].integer("n").unwrap(), 1);
    }
}
