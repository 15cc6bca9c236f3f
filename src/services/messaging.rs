//! Agent registration and the inter-agent message inbox.

use std::sync::Arc;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Agent, EventPayload, Importance, Message, NewEvent};
use crate::domain::ports::storage::{SqlRow, SqlValue, StorageAdapter};
use crate::services::event_store::EventStore;

/// Default byte cap applied to message bodies in inbox summaries.
pub const DEFAULT_PREVIEW_BYTES: usize = 240;

#[derive(Debug, Clone, Default)]
pub struct RegisterAgentOptions {
    pub program: String,
    pub model: String,
    pub task_description: String,
}

#[derive(Debug, Clone, Default)]
pub struct SendMessageOptions {
    pub importance: Importance,
    pub thread_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct InboxOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub unread_only: bool,
    pub thread_id: Option<String>,
    pub since_sequence: Option<i64>,
}

/// Messaging operations over the agents/messages projections.
#[derive(Clone)]
pub struct MessagingService {
    store: EventStore,
    preview_bytes: usize,
}

impl MessagingService {
    pub fn new(store: EventStore) -> Self {
        Self { store, preview_bytes: DEFAULT_PREVIEW_BYTES }
    }

    pub fn with_preview_bytes(mut self, preview_bytes: usize) -> Self {
        self.preview_bytes = preview_bytes;
        self
    }

    fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        self.store.adapter()
    }

    /// Register (or re-register) an agent in a project.
    pub async fn register_agent(
        &self,
        project: &str,
        name: &str,
        options: RegisterAgentOptions,
    ) -> CoreResult<Agent> {
        if name.trim().is_empty() {
            return Err(CoreError::invalid("agent name must not be empty"));
        }

        let event = self
            .store
            .append(NewEvent::new(
                project,
                EventPayload::AgentRegistered {
                    name: name.to_string(),
                    program: options.program.clone(),
                    model: options.model.clone(),
                    task_description: options.task_description.clone(),
                },
            ))
            .await?;

        let at = crate::domain::models::ms_to_datetime(event.timestamp_ms);
        Ok(Agent {
            name: name.to_string(),
            project_key: project.to_string(),
            program: options.program,
            model: options.model,
            task_description: options.task_description,
            registered_at: at,
            last_active_at: at,
        })
    }

    pub async fn list_agents(&self, project: &str) -> CoreResult<Vec<Agent>> {
        let rows = self
            .adapter()
            .query(
                "SELECT project_key, name, program, model, task_description, registered_at, last_active_at
                 FROM agents WHERE project_key = ? ORDER BY name",
                &[SqlValue::from(project)],
            )
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    /// Send a message to one or more agents. Fails with `Invalid` when the
    /// recipient list is empty.
    pub async fn send_message(
        &self,
        project: &str,
        from: &str,
        to: &[&str],
        subject: &str,
        body: &str,
        options: SendMessageOptions,
    ) -> CoreResult<Message> {
        if to.is_empty() {
            return Err(CoreError::invalid("message must have at least one recipient"));
        }

        let message_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
        let event = self
            .store
            .append(NewEvent::new(
                project,
                EventPayload::MessageSent {
                    message_id: message_id.clone(),
                    from: from.to_string(),
                    to: to.iter().map(|s| (*s).to_string()).collect(),
                    subject: subject.to_string(),
                    body: body.to_string(),
                    thread_id: options.thread_id.clone(),
                    importance: options.importance,
                    metadata: options.metadata.clone(),
                },
            ))
            .await?;

        Ok(Message {
            id: message_id,
            project_key: project.to_string(),
            from_agent: from.to_string(),
            to_agent: to[0].to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            thread_id: options.thread_id,
            importance: options.importance,
            metadata: options.metadata,
            sequence: event.sequence,
            sent_at: crate::domain::models::ms_to_datetime(event.timestamp_ms),
            read_at: None,
            acked_at: None,
        })
    }

    /// Messages addressed to `agent`, urgent first, then most recent.
    /// Bodies are truncated to the preview limit; `read_message` returns the
    /// full text.
    pub async fn inbox(
        &self,
        project: &str,
        agent: &str,
        options: InboxOptions,
    ) -> CoreResult<Vec<Message>> {
        let mut sql = String::from(
            "SELECT m.id, m.project_key, m.from_agent, r.agent_name AS to_agent, m.subject,
                    m.body, m.thread_id, m.importance, m.metadata, m.sequence, m.sent_at,
                    r.read_at, r.acked_at
             FROM messages m
             JOIN message_recipients r ON r.message_id = m.id
             WHERE m.project_key = ? AND r.agent_name = ?",
        );
        let mut params: Vec<SqlValue> = vec![SqlValue::from(project), SqlValue::from(agent)];

        if options.unread_only {
            sql.push_str(" AND r.read_at IS NULL");
        }
        if let Some(thread_id) = &options.thread_id {
            sql.push_str(" AND m.thread_id = ?");
            params.push(SqlValue::from(thread_id.as_str()));
        }
        if let Some(since) = options.since_sequence {
            sql.push_str(" AND m.sequence > ?");
            params.push(SqlValue::Integer(since));
        }

        sql.push_str(
            " ORDER BY CASE m.importance
                 WHEN 'urgent' THEN 0
                 WHEN 'high' THEN 1
                 WHEN 'normal' THEN 2
                 ELSE 3 END,
               m.sent_at DESC,
               m.sequence DESC",
        );

        let limit = options.limit.unwrap_or(50);
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::from(limit)));
        if let Some(offset) = options.offset {
            sql.push_str(" OFFSET ?");
            params.push(SqlValue::Integer(i64::from(offset)));
        }

        let rows = self.adapter().query(&sql, &params).await?;
        rows.iter()
            .map(|row| Ok(row_to_message(row)?.truncated(self.preview_bytes)))
            .collect()
    }

    /// Full message for one recipient; emits `message_read` (idempotent on
    /// repeat).
    pub async fn read_message(
        &self,
        project: &str,
        message_id: &str,
        agent: &str,
    ) -> CoreResult<Message> {
        let message = self.fetch_message(project, message_id, agent).await?;

        self.store
            .append(NewEvent::new(
                project,
                EventPayload::MessageRead {
                    message_id: message_id.to_string(),
                    agent: agent.to_string(),
                },
            ))
            .await?;

        Ok(message)
    }

    /// Acknowledge a message; emits `message_acked` (idempotent on repeat).
    pub async fn ack_message(
        &self,
        project: &str,
        message_id: &str,
        agent: &str,
    ) -> CoreResult<()> {
        // Fail fast when the recipient row does not exist.
        self.fetch_message(project, message_id, agent).await?;

        self.store
            .append(NewEvent::new(
                project,
                EventPayload::MessageAcked {
                    message_id: message_id.to_string(),
                    agent: agent.to_string(),
                },
            ))
            .await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        project: &str,
        message_id: &str,
        agent: &str,
    ) -> CoreResult<Message> {
        let rows = self
            .adapter()
            .query(
                "SELECT m.id, m.project_key, m.from_agent, r.agent_name AS to_agent, m.subject,
                        m.body, m.thread_id, m.importance, m.metadata, m.sequence, m.sent_at,
                        r.read_at, r.acked_at
                 FROM messages m
                 JOIN message_recipients r ON r.message_id = m.id
                 WHERE m.project_key = ? AND m.id = ? AND r.agent_name = ?",
                &[SqlValue::from(project), SqlValue::from(message_id), SqlValue::from(agent)],
            )
            .await?;
        rows.first()
            .map(row_to_message)
            .transpose()?
            .ok_or_else(|| {
                CoreError::not_found(format!("message {message_id} not found for agent {agent}"))
            })
    }
}

fn row_to_agent(row: &SqlRow) -> CoreResult<Agent> {
    Ok(Agent {
        project_key: row.text("project_key")?,
        name: row.text("name")?,
        program: row.text("program")?,
        model: row.text("model")?,
        task_description: row.text("task_description")?,
        registered_at: row.datetime("registered_at")?,
        last_active_at: row.datetime("last_active_at")?,
    })
}

fn row_to_message(row: &SqlRow) -> CoreResult<Message> {
    let importance_raw = row.text("importance")?;
    let importance = Importance::from_str(&importance_raw).ok_or_else(|| {
        CoreError::corruption(format!("unknown importance '{importance_raw}' in messages row"))
    })?;
    let metadata = match row.json("metadata")? {
        serde_json::Value::Null => None,
        value => Some(value),
    };
    Ok(Message {
        id: row.text("id")?,
        project_key: row.text("project_key")?,
        from_agent: row.text("from_agent")?,
        to_agent: row.text("to_agent")?,
        subject: row.text("subject")?,
        body: row.text("body")?,
        thread_id: row.opt_text("thread_id")?,
        importance,
        metadata,
        sequence: row.integer("sequence")?,
        sent_at: row.datetime("sent_at")?,
        read_at: row.opt_datetime("read_at")?,
        acked_at: row.opt_datetime("acked_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::migrations::run_migrations;
    use crate::adapters::sqlite::{connection::create_test_pool, SqliteAdapter};
    use crate::domain::errors::ErrorKind;

    async fn service() -> MessagingService {
        let adapter = SqliteAdapter::new(create_test_pool().await.unwrap());
        run_migrations(&adapter).await.unwrap();
        MessagingService::new(EventStore::new(Arc::new(adapter)))
    }

    #[tokio::test]
    async fn test_register_and_list_agents() {
        let svc = service().await;
        svc.register_agent(
            "p",
            "worker-1",
            RegisterAgentOptions {
                program: "claude-code".into(),
                model: "sonnet".into(),
                task_description: "build the parser".into(),
            },
        )
        .await
        .unwrap();

        let agents = svc.list_agents("p").await.unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].name, "worker-1");
        assert_eq!(agents[0].task_description, "build the parser");

        assert!(svc.list_agents("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_requires_recipients() {
        let svc = service().await;
        let err = svc
            .send_message("p", "a", &[], "subject", "body", SendMessageOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn test_inbox_orders_by_importance_then_recency() {
        let svc = service().await;
        for (subject, importance) in [
            ("low-1", Importance::Low),
            ("urgent-1", Importance::Urgent),
            ("normal-1", Importance::Normal),
            ("urgent-2", Importance::Urgent),
            ("high-1", Importance::High),
        ] {
            svc.send_message(
                "p",
                "coordinator",
                &["worker"],
                subject,
                "body",
                SendMessageOptions { importance, ..Default::default() },
            )
            .await
            .unwrap();
        }

        let inbox = svc.inbox("p", "worker", InboxOptions::default()).await.unwrap();
        let subjects: Vec<&str> = inbox.iter().map(|m| m.subject.as_str()).collect();
        // Urgent first (most recent of the two leads), then high, normal, low.
        assert_eq!(subjects, vec!["urgent-2", "urgent-1", "high-1", "normal-1", "low-1"]);
    }

    #[tokio::test]
    async fn test_read_and_ack_are_idempotent() {
        let svc = service().await;
        let sent = svc
            .send_message("p", "a", &["b"], "s", "body", SendMessageOptions::default())
            .await
            .unwrap();

        let first = svc.read_message("p", &sent.id, "b").await.unwrap();
        assert!(first.read_at.is_none());

        let inbox = svc.inbox("p", "b", InboxOptions::default()).await.unwrap();
        let read_at = inbox[0].read_at.unwrap();

        // Second read does not move the timestamp.
        svc.read_message("p", &sent.id, "b").await.unwrap();
        let inbox = svc.inbox("p", "b", InboxOptions::default()).await.unwrap();
        assert_eq!(inbox[0].read_at.unwrap(), read_at);

        svc.ack_message("p", &sent.id, "b").await.unwrap();
        let inbox = svc.inbox("p", "b", InboxOptions::default()).await.unwrap();
        let acked_at = inbox[0].acked_at.unwrap();
        assert!(acked_at >= read_at);

        svc.ack_message("p", &sent.id, "b").await.unwrap();
        let inbox = svc.inbox("p", "b", InboxOptions::default()).await.unwrap();
        assert_eq!(inbox[0].acked_at.unwrap(), acked_at);
    }

    #[tokio::test]
    async fn test_unread_only_filter() {
        let svc = service().await;
        let first = svc
            .send_message("p", "a", &["b"], "one", "body", SendMessageOptions::default())
            .await
            .unwrap();
        svc.send_message("p", "a", &["b"], "two", "body", SendMessageOptions::default())
            .await
            .unwrap();

        svc.read_message("p", &first.id, "b").await.unwrap();
        let unread = svc
            .inbox("p", "b", InboxOptions { unread_only: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].subject, "two");
    }

    #[tokio::test]
    async fn test_fanout_tracks_recipients_separately() {
        let svc = service().await;
        let sent = svc
            .send_message("p", "a", &["b", "c"], "s", "body", SendMessageOptions::default())
            .await
            .unwrap();

        svc.read_message("p", &sent.id, "b").await.unwrap();

        let b_inbox = svc.inbox("p", "b", InboxOptions::default()).await.unwrap();
        let c_inbox = svc.inbox("p", "c", InboxOptions::default()).await.unwrap();
        assert!(b_inbox[0].read_at.is_some());
        assert!(c_inbox[0].read_at.is_none());
    }

    #[tokio::test]
    async fn test_thread_ordering_follows_sequence() {
        let svc = service().await;
        for i in 0..3 {
            svc.send_message(
                "p",
                "a",
                &["b"],
                &format!("m{i}"),
                "body",
                SendMessageOptions { thread_id: Some("t1".into()), ..Default::default() },
            )
            .await
            .unwrap();
        }
        let thread = svc
            .inbox("p", "b", InboxOptions { thread_id: Some("t1".into()), ..Default::default() })
            .await
            .unwrap();
        let mut sequences: Vec<i64> = thread.iter().map(|m| m.sequence).collect();
        let sorted = {
            let mut s = sequences.clone();
            s.sort_unstable();
            s
        };
        sequences.reverse(); // inbox is most-recent first within a tier
        assert_eq!(sequences, sorted);
    }
}
