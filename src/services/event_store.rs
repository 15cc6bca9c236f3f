//! Append-only event store with in-transaction projection updates.
//!
//! Every append allocates the next gap-free `sequence`, inserts the event
//! row, and applies the projection registry for that event type, all inside
//! one transaction. No event is visible to readers before its projections
//! are.

use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{now_ms, Event, EventPayload, NewEvent};
use crate::domain::ports::storage::{with_tx, SqlValue, StorageAdapter, StorageTx};
use crate::services::projections;

/// Filter for [`EventStore::read`]. All criteria are conjunctive;
/// `after_sequence` is strict (`sequence > after_sequence`).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub project_key: Option<String>,
    pub types: Vec<String>,
    pub after_sequence: Option<i64>,
    pub from_timestamp_ms: Option<i64>,
    pub to_timestamp_ms: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project_key(mut self, project_key: impl Into<String>) -> Self {
        self.project_key = Some(project_key.into());
        self
    }

    pub fn types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn after_sequence(mut self, sequence: i64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    pub fn from_timestamp_ms(mut self, ms: i64) -> Self {
        self.from_timestamp_ms = Some(ms);
        self
    }

    pub fn to_timestamp_ms(mut self, ms: i64) -> Self {
        self.to_timestamp_ms = Some(ms);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// The durable event log plus its projection registry.
#[derive(Clone)]
pub struct EventStore {
    adapter: Arc<dyn StorageAdapter>,
}

impl EventStore {
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    /// Append one event and update its projections atomically.
    pub async fn append(&self, event: NewEvent) -> CoreResult<Event> {
        let store = self.clone();
        with_tx(self.adapter.as_ref(), move |tx| {
            Box::pin(async move { store.append_in_tx(tx, event).await })
        })
        .await
    }

    /// Append a batch in one transaction, preserving input order.
    pub async fn append_batch(&self, events: Vec<NewEvent>) -> CoreResult<Vec<Event>> {
        let store = self.clone();
        with_tx(self.adapter.as_ref(), move |tx| {
            Box::pin(async move {
                let mut appended = Vec::with_capacity(events.len());
                for event in events {
                    appended.push(store.append_in_tx(tx, event).await?);
                }
                Ok(appended)
            })
        })
        .await
    }

    /// Append inside a caller-owned transaction. Used by operations that
    /// must commit additional writes (embeddings) with the event.
    pub async fn append_in_tx(
        &self,
        tx: &mut dyn StorageTx,
        event: NewEvent,
    ) -> CoreResult<Event> {
        let timestamp_ms = now_ms();
        let rows = tx
            .query("SELECT COALESCE(MAX(sequence), 0) + 1 AS next FROM events", &[])
            .await?;
        let sequence = rows
            .first()
            .ok_or_else(|| CoreError::corruption("sequence allocation returned no row"))?
            .integer("next")?;

        let data = event.payload.data_json()?;
        let rows = tx
            .query(
                "INSERT INTO events (sequence, event_type, project_key, timestamp_ms, data)
                 VALUES (?, ?, ?, ?, ?)
                 RETURNING id",
                &[
                    SqlValue::Integer(sequence),
                    SqlValue::from(event.payload.event_type()),
                    SqlValue::from(event.project_key.as_str()),
                    SqlValue::Integer(timestamp_ms),
                    SqlValue::Json(data),
                ],
            )
            .await?;
        let id = rows
            .first()
            .ok_or_else(|| CoreError::corruption("insert returned no id"))?
            .integer("id")?;

        let event = Event {
            id,
            sequence,
            project_key: event.project_key,
            timestamp_ms,
            payload: event.payload,
        };

        projections::apply(&event, tx).await?;

        tracing::debug!(
            sequence,
            event_type = event.payload.event_type(),
            project_key = %event.project_key,
            "event appended"
        );
        Ok(event)
    }

    /// Read events in ascending sequence order.
    pub async fn read(&self, filter: EventFilter) -> CoreResult<Vec<Event>> {
        let (sql, params) = build_read_query(&filter);
        let rows = self.adapter.query(&sql, &params).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(row_to_event(row)?);
        }
        Ok(events)
    }

    /// Highest sequence in the log, 0 when empty.
    pub async fn latest_sequence(&self, project_key: Option<&str>) -> CoreResult<i64> {
        let (sql, params) = match project_key {
            Some(project) => (
                "SELECT COALESCE(MAX(sequence), 0) AS latest FROM events WHERE project_key = ?",
                vec![SqlValue::from(project)],
            ),
            None => ("SELECT COALESCE(MAX(sequence), 0) AS latest FROM events", Vec::new()),
        };
        let rows = self.adapter.query(sql, &params).await?;
        rows.first().map_or(Ok(0), |row| row.integer("latest"))
    }

    /// Event counts grouped by type, for the stream stats endpoint.
    pub async fn counts_by_type(
        &self,
        project_key: Option<&str>,
    ) -> CoreResult<Vec<(String, i64)>> {
        let (sql, params) = match project_key {
            Some(project) => (
                "SELECT event_type, COUNT(*) AS n FROM events WHERE project_key = ?
                 GROUP BY event_type ORDER BY event_type",
                vec![SqlValue::from(project)],
            ),
            None => (
                "SELECT event_type, COUNT(*) AS n FROM events GROUP BY event_type
                 ORDER BY event_type",
                Vec::new(),
            ),
        };
        let rows = self.adapter.query(sql, &params).await?;
        rows.iter()
            .map(|row| Ok((row.text("event_type")?, row.integer("n")?)))
            .collect()
    }

    pub async fn count(&self, project_key: Option<&str>) -> CoreResult<i64> {
        let (sql, params) = match project_key {
            Some(project) => (
                "SELECT COUNT(*) AS n FROM events WHERE project_key = ?",
                vec![SqlValue::from(project)],
            ),
            None => ("SELECT COUNT(*) AS n FROM events", Vec::new()),
        };
        let rows = self.adapter.query(sql, &params).await?;
        rows.first().map_or(Ok(0), |row| row.integer("n"))
    }
}

pub(crate) fn build_read_query(filter: &EventFilter) -> (String, Vec<SqlValue>) {
    let mut sql = String::from(
        "SELECT id, sequence, event_type, project_key, timestamp_ms, data FROM events WHERE 1=1",
    );
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(project) = &filter.project_key {
        sql.push_str(" AND project_key = ?");
        params.push(SqlValue::from(project.as_str()));
    }
    if !filter.types.is_empty() {
        let placeholders = vec!["?"; filter.types.len()].join(", ");
        sql.push_str(&format!(" AND event_type IN ({placeholders})"));
        for event_type in &filter.types {
            params.push(SqlValue::from(event_type.as_str()));
        }
    }
    if let Some(after) = filter.after_sequence {
        sql.push_str(" AND sequence > ?");
        params.push(SqlValue::Integer(after));
    }
    if let Some(from) = filter.from_timestamp_ms {
        sql.push_str(" AND timestamp_ms >= ?");
        params.push(SqlValue::Integer(from));
    }
    if let Some(to) = filter.to_timestamp_ms {
        sql.push_str(" AND timestamp_ms <= ?");
        params.push(SqlValue::Integer(to));
    }

    sql.push_str(" ORDER BY sequence ASC");

    if filter.limit.is_some() || filter.offset.is_some() {
        // OFFSET requires LIMIT on SQLite; an i64::MAX limit is unbounded
        // on both dialects.
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(filter.limit.map_or(i64::MAX, i64::from)));
    }
    if let Some(offset) = filter.offset {
        sql.push_str(" OFFSET ?");
        params.push(SqlValue::Integer(i64::from(offset)));
    }

    (sql, params)
}

pub(crate) fn row_to_event(row: &crate::domain::ports::storage::SqlRow) -> CoreResult<Event> {
    let event_type = row.text("event_type")?;
    let data = row.json("data")?;
    let payload = EventPayload::from_parts(&event_type, data).map_err(|e| {
        CoreError::corruption(format!("stored event of type '{event_type}' failed to parse: {e}"))
    })?;
    Ok(Event {
        id: row.integer("id")?,
        sequence: row.integer("sequence")?,
        project_key: row.text("project_key")?,
        timestamp_ms: row.integer("timestamp_ms")?,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::migrations::run_migrations;
    use crate::adapters::sqlite::{connection::create_test_pool, SqliteAdapter};

    async fn store() -> EventStore {
        let adapter = SqliteAdapter::new(create_test_pool().await.unwrap());
        run_migrations(&adapter).await.unwrap();
        EventStore::new(Arc::new(adapter))
    }

    fn register(name: &str, project: &str) -> NewEvent {
        NewEvent::new(
            project,
            EventPayload::AgentRegistered {
                name: name.into(),
                program: "claude-code".into(),
                model: "sonnet".into(),
                task_description: "test".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_append_read_latest() {
        let store = store().await;
        assert_eq!(store.latest_sequence(None).await.unwrap(), 0);

        let appended = store.append(register("A1", "p")).await.unwrap();
        assert_eq!(appended.sequence, 1);

        let events = store.read(EventFilter::new().project_key("p")).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[0].payload.event_type(), "agent_registered");
        assert_eq!(store.latest_sequence(None).await.unwrap(), 1);
        assert_eq!(store.latest_sequence(Some("p")).await.unwrap(), 1);
        assert_eq!(store.latest_sequence(Some("other")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sequences_strictly_increase() {
        let store = store().await;
        let mut last = 0;
        for i in 0..10 {
            let event = store.append(register(&format!("A{i}"), "p")).await.unwrap();
            assert!(event.sequence > last);
            last = event.sequence;
        }
        assert_eq!(last, 10);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_atomicity() {
        let store = store().await;
        let appended = store
            .append_batch(vec![register("A1", "p"), register("A2", "p"), register("A3", "q")])
            .await
            .unwrap();
        assert_eq!(appended.len(), 3);
        assert_eq!(appended[0].sequence, 1);
        assert_eq!(appended[1].sequence, 2);
        assert_eq!(appended[2].sequence, 3);
    }

    #[tokio::test]
    async fn test_read_filters() {
        let store = store().await;
        for i in 0..5 {
            store.append(register(&format!("A{i}"), "p")).await.unwrap();
        }
        store.append(register("B1", "q")).await.unwrap();

        let after = store
            .read(EventFilter::new().project_key("p").after_sequence(3))
            .await
            .unwrap();
        assert_eq!(after.len(), 2);
        assert!(after.iter().all(|e| e.sequence > 3));

        let by_type = store
            .read(EventFilter::new().types(["agent_registered"]))
            .await
            .unwrap();
        assert_eq!(by_type.len(), 6);

        let limited = store.read(EventFilter::new().limit(2).offset(1)).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_counts_by_type() {
        let store = store().await;
        store.append(register("A1", "p")).await.unwrap();
        store.append(register("A2", "p")).await.unwrap();
        let counts = store.counts_by_type(Some("p")).await.unwrap();
        assert_eq!(counts, vec![("agent_registered".to_string(), 2)]);
    }
}
