//! Storage port: a narrow, dialect-free surface over the two backends.
//!
//! Services write SQL with `?` placeholders; the Postgres adapter rewrites
//! them to `$N` internally. No call site branches on which backend is
//! active: the only dialect-aware pieces are the adapters themselves, the
//! per-backend migrations, and the vector/FTS search methods below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::domain::errors::{CoreError, CoreResult};

/// Which concrete engine backs an adapter. Consumed by the migration runner
/// only; services never see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Postgres,
}

/// A bind parameter. Timestamps and JSON get their own variants so each
/// backend can map them to its native column type (`TEXT`/`TIMESTAMPTZ`,
/// `TEXT`/`JSONB`).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A normalised result row: column names and decoded values, no driver types.
#[derive(Debug, Clone, Default)]
pub struct SqlRow {
    entries: Vec<(String, SqlValue)>,
}

impl SqlRow {
    pub fn new(entries: Vec<(String, SqlValue)>) -> Self {
        Self { entries }
    }

    pub fn value(&self, column: &str) -> CoreResult<&SqlValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
            .ok_or_else(|| CoreError::corruption(format!("missing column '{column}' in result row")))
    }

    pub fn text(&self, column: &str) -> CoreResult<String> {
        self.opt_text(column)?
            .ok_or_else(|| CoreError::corruption(format!("column '{column}' was NULL")))
    }

    pub fn opt_text(&self, column: &str) -> CoreResult<Option<String>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Integer(v) => Ok(Some(v.to_string())),
            SqlValue::Real(v) => Ok(Some(v.to_string())),
            SqlValue::Timestamp(t) => Ok(Some(t.to_rfc3339())),
            SqlValue::Json(v) => Ok(Some(v.to_string())),
            SqlValue::Blob(_) => Err(CoreError::corruption(format!(
                "column '{column}' holds a blob, expected text"
            ))),
        }
    }

    pub fn integer(&self, column: &str) -> CoreResult<i64> {
        self.opt_integer(column)?
            .ok_or_else(|| CoreError::corruption(format!("column '{column}' was NULL")))
    }

    pub fn opt_integer(&self, column: &str) -> CoreResult<Option<i64>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(v) => Ok(Some(*v)),
            #[allow(clippy::cast_possible_truncation)]
            SqlValue::Real(v) => Ok(Some(*v as i64)),
            SqlValue::Text(s) => s.parse::<i64>().map(Some).map_err(|_| {
                CoreError::corruption(format!("column '{column}' is not an integer: {s:?}"))
            }),
            _ => Err(CoreError::corruption(format!(
                "column '{column}' is not an integer"
            ))),
        }
    }

    pub fn real(&self, column: &str) -> CoreResult<f64> {
        match self.value(column)? {
            SqlValue::Real(v) => Ok(*v),
            #[allow(clippy::cast_precision_loss)]
            SqlValue::Integer(v) => Ok(*v as f64),
            other => Err(CoreError::corruption(format!(
                "column '{column}' is not a real value: {other:?}"
            ))),
        }
    }

    pub fn boolean(&self, column: &str) -> CoreResult<bool> {
        Ok(self.integer(column)? != 0)
    }

    pub fn blob(&self, column: &str) -> CoreResult<Vec<u8>> {
        match self.value(column)? {
            SqlValue::Blob(b) => Ok(b.clone()),
            other => Err(CoreError::corruption(format!(
                "column '{column}' is not a blob: {other:?}"
            ))),
        }
    }

    pub fn json(&self, column: &str) -> CoreResult<serde_json::Value> {
        match self.value(column)? {
            SqlValue::Json(v) => Ok(v.clone()),
            SqlValue::Text(s) => Ok(serde_json::from_str(s)?),
            SqlValue::Null => Ok(serde_json::Value::Null),
            other => Err(CoreError::corruption(format!(
                "column '{column}' is not JSON: {other:?}"
            ))),
        }
    }

    pub fn datetime(&self, column: &str) -> CoreResult<DateTime<Utc>> {
        self.opt_datetime(column)?
            .ok_or_else(|| CoreError::corruption(format!("column '{column}' was NULL")))
    }

    pub fn opt_datetime(&self, column: &str) -> CoreResult<Option<DateTime<Utc>>> {
        match self.value(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(t) => Ok(Some(*t)),
            SqlValue::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| {
                    CoreError::corruption(format!("column '{column}' is not a timestamp: {e}"))
                }),
            SqlValue::Integer(ms) => Ok(Some(crate::domain::models::ms_to_datetime(*ms))),
            other => Err(CoreError::corruption(format!(
                "column '{column}' is not a timestamp: {other:?}"
            ))),
        }
    }
}

/// One vector-search hit, already converted to similarity (`1 - distance`).
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub memory_id: String,
    pub similarity: f64,
}

/// One full-text hit with a positive, descending score.
#[derive(Debug, Clone)]
pub struct FtsHit {
    pub memory_id: String,
    pub score: f64,
}

/// Uniform query/exec/transaction surface over one storage engine.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> CoreResult<Vec<SqlRow>>;

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> CoreResult<u64>;

    /// Open a transaction. Dropping the returned handle without `commit`
    /// rolls back.
    async fn begin(&self) -> CoreResult<Box<dyn StorageTx>>;

    /// Nearest-neighbour search over memory embeddings. Dialect-specific:
    /// pgvector `<=>` on Postgres, in-process cosine over blobs on SQLite.
    async fn vector_search(&self, embedding: &[f32], limit: u32) -> CoreResult<Vec<VectorHit>>;

    /// Full-text search over memory content, normalised to a positive
    /// descending score.
    async fn fts_search(&self, query: &str, limit: u32) -> CoreResult<Vec<FtsHit>>;

    fn backend(&self) -> BackendKind;
}

/// An open transaction. All-or-nothing: either `commit` succeeds or no
/// statement took effect.
#[async_trait]
pub trait StorageTx: Send {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<Vec<SqlRow>>;

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<u64>;

    /// Run a multi-statement script (migration DDL) without parameters.
    async fn execute_batch(&mut self, sql: &str) -> CoreResult<()>;

    /// Write one memory embedding inside this transaction. Lives here so
    /// `memory + embedding` commit atomically despite the vector column
    /// diverging per dialect.
    async fn insert_embedding(&mut self, memory_id: &str, embedding: &[f32]) -> CoreResult<()>;

    async fn commit(self: Box<Self>) -> CoreResult<()>;

    async fn rollback(self: Box<Self>) -> CoreResult<()>;
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on
/// `Err`. A rollback failure after a caller error surfaces a composite
/// `Transient` error naming both.
pub async fn with_tx<T, F>(adapter: &dyn StorageAdapter, f: F) -> CoreResult<T>
where
    F: for<'a> FnOnce(&'a mut dyn StorageTx) -> BoxFuture<'a, CoreResult<T>> + Send,
    T: Send,
{
    let mut tx = adapter.begin().await?;
    let result = f(tx.as_mut()).await;
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => match tx.rollback().await {
            Ok(()) => Err(err),
            Err(rollback_err) => Err(CoreError::transient(format!(
                "rollback failed after error: {err}; rollback: {rollback_err}"
            ))),
        },
    }
}

/// Encode an embedding as little-endian f32 bytes, the blob wire format
/// shared by both backends' `memory_embeddings` side storage.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode little-endian f32 bytes back into a vector.
pub fn blob_to_embedding(blob: &[u8]) -> CoreResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(CoreError::corruption(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_typed_getters() {
        let row = SqlRow::new(vec![
            ("id".into(), SqlValue::Text("bd-1".into())),
            ("priority".into(), SqlValue::Integer(2)),
            ("score".into(), SqlValue::Real(0.5)),
            ("closed_at".into(), SqlValue::Null),
            ("metadata".into(), SqlValue::Text(r#"{"a":1}"#.into())),
        ]);
        assert_eq!(row.text("id").unwrap(), "bd-1");
        assert_eq!(row.integer("priority").unwrap(), 2);
        assert!((row.real("score").unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(row.opt_text("closed_at").unwrap(), None);
        assert_eq!(row.json("metadata").unwrap()["a"], 1);
        assert!(row.text("missing").is_err());
    }

    #[test]
    fn test_datetime_accepts_text_and_millis() {
        let now = Utc::now();
        let row = SqlRow::new(vec![
            ("a".into(), SqlValue::Text(now.to_rfc3339())),
            ("b".into(), SqlValue::Integer(now.timestamp_millis())),
            ("c".into(), SqlValue::Timestamp(now)),
        ]);
        assert_eq!(row.datetime("a").unwrap().timestamp_millis(), now.timestamp_millis());
        assert_eq!(row.datetime("b").unwrap().timestamp_millis(), now.timestamp_millis());
        assert_eq!(row.datetime("c").unwrap(), now);
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let embedding = vec![0.25_f32, -1.5, 3.0];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob.len(), 12);
        assert_eq!(blob_to_embedding(&blob).unwrap(), embedding);
        assert!(blob_to_embedding(&blob[..5]).is_err());
    }

    #[test]
    fn test_option_into_sql_value() {
        assert_eq!(SqlValue::from(Option::<String>::None), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3_i64)), SqlValue::Integer(3));
    }
}
