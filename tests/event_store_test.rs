//! Event log acceptance tests: append/read/latest, sequence monotonicity,
//! and projection consistency after each append.

mod common;

use hivemind::domain::models::{EventPayload, Importance, NewEvent};
use hivemind::services::{
    messaging::{RegisterAgentOptions, SendMessageOptions},
    EventFilter, MessagingService,
};

fn register(name: &str, project: &str) -> NewEvent {
    NewEvent::new(
        project,
        EventPayload::AgentRegistered {
            name: name.into(),
            program: "claude-code".into(),
            model: "sonnet".into(),
            task_description: "test agent".into(),
        },
    )
}

#[tokio::test]
async fn append_read_latest_on_empty_database() {
    let store = common::setup_store().await;

    assert_eq!(store.latest_sequence(None).await.unwrap(), 0);

    store.append(register("A1", "p")).await.unwrap();

    let events = store.read(EventFilter::new().project_key("p")).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sequence, 1);
    assert_eq!(events[0].payload.event_type(), "agent_registered");
    assert_eq!(store.latest_sequence(None).await.unwrap(), 1);
}

#[tokio::test]
async fn sequences_are_strictly_increasing() {
    let store = common::setup_store().await;
    let mut previous = 0;
    for i in 0..25 {
        let event = store.append(register(&format!("A{i}"), "p")).await.unwrap();
        assert!(event.sequence > previous, "sequence went backwards at {i}");
        previous = event.sequence;
    }
}

#[tokio::test]
async fn projection_reflects_event_before_next_read() {
    let store = common::setup_store().await;
    let messaging = MessagingService::new(store.clone());

    messaging
        .register_agent("p", "worker", RegisterAgentOptions::default())
        .await
        .unwrap();
    // The roster query must already see the agent.
    let agents = messaging.list_agents("p").await.unwrap();
    assert_eq!(agents.len(), 1);

    messaging
        .send_message(
            "p",
            "worker",
            &["worker"],
            "note to self",
            "body",
            SendMessageOptions { importance: Importance::High, ..Default::default() },
        )
        .await
        .unwrap();
    let inbox = messaging.inbox("p", "worker", Default::default()).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].subject, "note to self");
}

#[tokio::test]
async fn batch_append_is_atomic_and_ordered() {
    let store = common::setup_store().await;
    let events = store
        .append_batch(vec![register("A", "p"), register("B", "p"), register("C", "q")])
        .await
        .unwrap();
    let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);

    // Per-project filtering respects the tenant boundary.
    let p_events = store.read(EventFilter::new().project_key("p")).await.unwrap();
    assert_eq!(p_events.len(), 2);
    let q_events = store.read(EventFilter::new().project_key("q")).await.unwrap();
    assert_eq!(q_events.len(), 1);
}

#[tokio::test]
async fn after_sequence_is_strict() {
    let store = common::setup_store().await;
    for i in 0..5 {
        store.append(register(&format!("A{i}"), "p")).await.unwrap();
    }
    let events = store.read(EventFilter::new().after_sequence(3)).await.unwrap();
    let sequences: Vec<i64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![4, 5]);
}

#[tokio::test]
async fn timestamp_filters_bound_reads() {
    let store = common::setup_store().await;
    let first = store.append(register("A", "p")).await.unwrap();
    let events = store
        .read(EventFilter::new().from_timestamp_ms(first.timestamp_ms - 1000).to_timestamp_ms(first.timestamp_ms + 1000))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let none = store
        .read(EventFilter::new().from_timestamp_ms(first.timestamp_ms + 60_000))
        .await
        .unwrap();
    assert!(none.is_empty());
}
