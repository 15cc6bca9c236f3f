//! Reservation arbiter acceptance tests: idempotent retry, exclusivity
//! safety, and scoped release.

mod common;

use hivemind::domain::ErrorKind;
use hivemind::services::reservations::{patterns_overlap, ReserveOptions};
use hivemind::services::ReservationService;
use proptest::prelude::*;

#[tokio::test]
async fn idempotent_retry_yields_one_active_reservation() {
    let svc = ReservationService::new(common::setup_store().await);

    svc.reserve_files("p", "W", &["src/**".into()], ReserveOptions::default()).await.unwrap();
    svc.reserve_files("p", "W", &["src/**".into()], ReserveOptions::default()).await.unwrap();

    let active = svc.active_reservations("p").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].agent_name, "W");
    assert_eq!(active[0].path_pattern, "src/**");
    assert!(active[0].exclusive);
}

#[tokio::test]
async fn no_conflicting_exclusive_pair_can_exist() {
    let svc = ReservationService::new(common::setup_store().await);

    svc.reserve_files("p", "w1", &["src/**".into()], ReserveOptions::default()).await.unwrap();

    // Exclusive-vs-exclusive, exclusive-vs-shared, shared-vs-exclusive.
    for exclusive in [true, false] {
        let result = svc
            .reserve_files(
                "p",
                "w2",
                &["src/parser/mod.rs".into()],
                ReserveOptions { exclusive, ..Default::default() },
            )
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Conflict);
    }

    // The safety property holds: every active overlapping pair shares an
    // owner or is shared-shared.
    let active = svc.active_reservations("p").await.unwrap();
    for a in &active {
        for b in &active {
            if a.id != b.id && patterns_overlap(&a.path_pattern, &b.path_pattern) {
                assert!(
                    a.agent_name == b.agent_name || (!a.exclusive && !b.exclusive),
                    "violating pair: {a:?} / {b:?}"
                );
            }
        }
    }
}

#[tokio::test]
async fn release_frees_pattern_for_others() {
    let svc = ReservationService::new(common::setup_store().await);

    svc.reserve_files("p", "w1", &["src/**".into()], ReserveOptions::default()).await.unwrap();
    svc.release_files("p", "w1", None).await.unwrap();
    svc.reserve_files("p", "w2", &["src/**".into()], ReserveOptions::default()).await.unwrap();

    let active = svc.active_reservations("p").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].agent_name, "w2");
}

#[tokio::test]
async fn scoped_reservation_always_releases() {
    let svc = ReservationService::new(common::setup_store().await);

    // Success path.
    let value = svc
        .scoped_reservation(
            "p",
            "w",
            &["docs/**".to_string()],
            ReserveOptions::default(),
            async { Ok(42) },
        )
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert!(svc.active_reservations("p").await.unwrap().is_empty());

    // Failure path.
    let result: Result<(), _> = svc
        .scoped_reservation(
            "p",
            "w",
            &["docs/**".to_string()],
            ReserveOptions::default(),
            async { Err(hivemind::CoreError::invalid("boom")) },
        )
        .await;
    assert!(result.is_err());
    assert!(svc.active_reservations("p").await.unwrap().is_empty());
}

#[tokio::test]
async fn reservations_are_per_project() {
    let svc = ReservationService::new(common::setup_store().await);

    svc.reserve_files("p", "w1", &["src/**".into()], ReserveOptions::default()).await.unwrap();
    // Same pattern, different project: no conflict.
    svc.reserve_files("q", "w2", &["src/**".into()], ReserveOptions::default()).await.unwrap();

    assert_eq!(svc.active_reservations("p").await.unwrap().len(), 1);
    assert_eq!(svc.active_reservations("q").await.unwrap().len(), 1);
}

proptest! {
    #[test]
    fn overlap_is_symmetric(
        a in "[a-c]{1,3}(/[a-c]{1,3}){0,2}(/\\*\\*|/\\*)?",
        b in "[a-c]{1,3}(/[a-c]{1,3}){0,2}(/\\*\\*|/\\*)?",
    ) {
        prop_assert_eq!(patterns_overlap(&a, &b), patterns_overlap(&b, &a));
    }

    #[test]
    fn pattern_overlaps_itself(a in "[a-c]{1,3}(/[a-c]{1,3}){0,2}(/\\*\\*)?") {
        prop_assert!(patterns_overlap(&a, &a));
    }
}
