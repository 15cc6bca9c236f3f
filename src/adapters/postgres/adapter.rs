//! Postgres implementation of the storage port.
//!
//! Services hand over `?`-placeholder SQL; this adapter rewrites it to the
//! `$N` positional form before preparing. JSON binds as JSONB, timestamps as
//! `TIMESTAMPTZ`, embeddings as pgvector literals with `<=>` cosine search,
//! and full-text queries go through `plainto_tsquery`/`ts_rank`.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo, ValueRef};

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::ports::storage::{
    BackendKind, FtsHit, SqlRow, SqlValue, StorageAdapter, StorageTx, VectorHit,
};

/// Postgres-backed storage adapter.
#[derive(Clone)]
pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Rewrite `?` placeholders to `$1..$N`, skipping quoted literals.
fn to_positional(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut in_string = false;
    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_string = !in_string;
                out.push(ch);
            }
            '?' if !in_string => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(ch),
        }
    }
    out
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Integer(v) => query.bind(*v),
            SqlValue::Real(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Blob(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> CoreResult<SqlRow> {
    let mut entries = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(index)
            .map_err(|e| CoreError::corruption(format!("failed to read column: {e}")))?;
        let value = if raw.is_null() {
            SqlValue::Null
        } else {
            match raw.type_info().name() {
                "INT2" => SqlValue::Integer(i64::from(row.try_get::<i16, _>(index)?)),
                "INT4" => SqlValue::Integer(i64::from(row.try_get::<i32, _>(index)?)),
                "INT8" => SqlValue::Integer(row.try_get::<i64, _>(index)?),
                "FLOAT4" => SqlValue::Real(f64::from(row.try_get::<f32, _>(index)?)),
                "FLOAT8" | "NUMERIC" => SqlValue::Real(row.try_get::<f64, _>(index)?),
                "BOOL" => SqlValue::Integer(i64::from(row.try_get::<bool, _>(index)?)),
                "BYTEA" => SqlValue::Blob(row.try_get::<Vec<u8>, _>(index)?),
                "JSON" | "JSONB" => SqlValue::Json(row.try_get::<serde_json::Value, _>(index)?),
                "TIMESTAMPTZ" => {
                    SqlValue::Timestamp(row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?)
                }
                _ => SqlValue::Text(row.try_get::<String, _>(index)?),
            }
        };
        entries.push((column.name().to_string(), value));
    }
    Ok(SqlRow::new(entries))
}

/// pgvector text literal: `[0.1,0.2,...]`.
fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 8 + 2);
    out.push('[');
    for (i, value) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&value.to_string());
    }
    out.push(']');
    out
}

#[async_trait]
impl StorageAdapter for PostgresAdapter {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> CoreResult<Vec<SqlRow>> {
        let sql = to_positional(sql);
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> CoreResult<u64> {
        let sql = to_positional(sql);
        let result = bind_params(sqlx::query(&sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> CoreResult<Box<dyn StorageTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn vector_search(&self, embedding: &[f32], limit: u32) -> CoreResult<Vec<VectorHit>> {
        let literal = vector_literal(embedding);
        let rows = sqlx::query(
            r"SELECT memory_id, 1 - (embedding <=> $1::vector) AS similarity
              FROM memory_embeddings
              ORDER BY embedding <=> $1::vector
              LIMIT $2",
        )
        .bind(&literal)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(VectorHit {
                    memory_id: row.try_get("memory_id")?,
                    similarity: row.try_get::<f64, _>("similarity")?,
                })
            })
            .collect()
    }

    async fn fts_search(&self, query: &str, limit: u32) -> CoreResult<Vec<FtsHit>> {
        let rows = sqlx::query(
            r"SELECT id AS memory_id,
                     ts_rank(to_tsvector('english', content),
                             plainto_tsquery('english', $1)) AS score
              FROM memories
              WHERE to_tsvector('english', content) @@ plainto_tsquery('english', $1)
              ORDER BY score DESC
              LIMIT $2",
        )
        .bind(query)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FtsHit {
                    memory_id: row.try_get("memory_id")?,
                    score: f64::from(row.try_get::<f32, _>("score")?),
                })
            })
            .collect()
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Postgres
    }
}

struct PostgresTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StorageTx for PostgresTx {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<Vec<SqlRow>> {
        let sql = to_positional(sql);
        let rows = bind_params(sqlx::query(&sql), params)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> CoreResult<u64> {
        let sql = to_positional(sql);
        let result = bind_params(sqlx::query(&sql), params)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn execute_batch(&mut self, sql: &str) -> CoreResult<()> {
        sqlx::Executor::execute(&mut *self.tx, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    async fn insert_embedding(&mut self, memory_id: &str, embedding: &[f32]) -> CoreResult<()> {
        let literal = vector_literal(embedding);
        sqlx::query(
            r"INSERT INTO memory_embeddings (memory_id, embedding) VALUES ($1, $2::vector)
              ON CONFLICT (memory_id) DO UPDATE SET embedding = EXCLUDED.embedding",
        )
        .bind(memory_id)
        .bind(&literal)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_rewrite() {
        assert_eq!(
            to_positional("SELECT * FROM t WHERE a = ? AND b = ?"),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn test_placeholder_rewrite_skips_string_literals() {
        assert_eq!(
            to_positional("SELECT '?' AS q, a FROM t WHERE b = ?"),
            "SELECT '?' AS q, a FROM t WHERE b = $1"
        );
    }

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.5, -1.0]), "[0.5,-1]");
    }
}
