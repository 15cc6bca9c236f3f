//! Replay acceptance tests: projection restoration after corruption and
//! byte-equivalent determinism across repeated replays.

mod common;

use hivemind::domain::ports::storage::SqlValue;
use hivemind::services::beads::CreateBeadOptions;
use hivemind::services::messaging::{RegisterAgentOptions, SendMessageOptions};
use hivemind::services::replay::ReplayOptions;
use hivemind::services::{BeadService, MessagingService, ReplayService};

#[tokio::test]
async fn replay_restores_overwritten_projection() {
    let store = common::setup_store().await;
    let messaging = MessagingService::new(store.clone());
    let replay = ReplayService::new(store.clone());

    messaging
        .register_agent(
            "p",
            "A1",
            RegisterAgentOptions { task_description: "Original".into(), ..Default::default() },
        )
        .await
        .unwrap();

    // Corrupt the projection behind the log's back.
    store
        .adapter()
        .execute(
            "UPDATE agents SET task_description = ? WHERE name = ?",
            &[SqlValue::from("Corrupted"), SqlValue::from("A1")],
        )
        .await
        .unwrap();
    let agents = messaging.list_agents("p").await.unwrap();
    assert_eq!(agents[0].task_description, "Corrupted");

    let report = replay
        .replay_events(ReplayOptions { clear_views: true, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(report.events_replayed, 1);

    let agents = messaging.list_agents("p").await.unwrap();
    assert_eq!(agents[0].task_description, "Original");
}

async fn dump_projections(store: &hivemind::services::EventStore) -> String {
    let mut dump = String::new();
    for table in ["agents", "messages", "message_recipients", "beads", "bead_dependencies", "bead_blockers", "bead_labels", "bead_comments", "reservations", "memories"] {
        let rows = store
            .adapter()
            .query(&format!("SELECT * FROM {table} ORDER BY 1, 2"), &[])
            .await
            .unwrap();
        dump.push_str(&format!("{table}: {rows:?}\n"));
    }
    dump
}

#[tokio::test]
async fn replay_is_deterministic() {
    let store = common::setup_store().await;
    let messaging = MessagingService::new(store.clone());
    let beads = BeadService::new(store.clone());
    let replay = ReplayService::new(store.clone());

    // Build a log that exercises several projection domains.
    messaging.register_agent("p", "coord", RegisterAgentOptions::default()).await.unwrap();
    messaging
        .send_message("p", "coord", &["coord"], "s", "b", SendMessageOptions::default())
        .await
        .unwrap();
    let b1 = beads.create_bead("p", "first", CreateBeadOptions::default()).await.unwrap();
    let b2 = beads.create_bead("p", "second", CreateBeadOptions::default()).await.unwrap();
    beads
        .add_dependency("p", &b2.id, &b1.id, hivemind::domain::models::DependencyKind::Blocks)
        .await
        .unwrap();
    beads.close_bead("p", &b1.id, Some("done")).await.unwrap();

    replay
        .replay_events(ReplayOptions { clear_views: true, ..Default::default() })
        .await
        .unwrap();
    let first = dump_projections(&store).await;

    replay
        .replay_events(ReplayOptions { clear_views: true, ..Default::default() })
        .await
        .unwrap();
    let second = dump_projections(&store).await;

    assert_eq!(first, second, "two replays of the same log diverged");
}

#[tokio::test]
async fn replay_rebuilds_blocked_cache() {
    let store = common::setup_store().await;
    let beads = BeadService::new(store.clone());
    let replay = ReplayService::new(store.clone());

    let b1 = beads.create_bead("p", "blocker", CreateBeadOptions::default()).await.unwrap();
    let b2 = beads.create_bead("p", "blocked", CreateBeadOptions::default()).await.unwrap();
    beads
        .add_dependency("p", &b2.id, &b1.id, hivemind::domain::models::DependencyKind::Blocks)
        .await
        .unwrap();
    assert!(beads.is_blocked("p", &b2.id).await.unwrap());

    replay
        .replay_events(ReplayOptions { clear_views: true, ..Default::default() })
        .await
        .unwrap();

    assert!(beads.is_blocked("p", &b2.id).await.unwrap());
    let ready = beads.get_next_ready_bead("p").await.unwrap().unwrap();
    assert_eq!(ready.id, b1.id);
}

#[tokio::test]
async fn replay_scoped_to_project() {
    let store = common::setup_store().await;
    let messaging = MessagingService::new(store.clone());
    let replay = ReplayService::new(store.clone());

    messaging.register_agent("p", "a", RegisterAgentOptions::default()).await.unwrap();
    messaging.register_agent("q", "b", RegisterAgentOptions::default()).await.unwrap();

    let report = replay
        .replay_events(ReplayOptions { project_key: Some("p".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(report.events_replayed, 1);
}
