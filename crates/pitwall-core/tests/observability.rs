//! Observability tests for Pitwall pipelines.
//!
//! These tests verify that structured tracing events are emitted for the key
//! pipeline steps and that pipelines run inside a race-scoped span.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use pitwall_chat::fakes::MemoryChatService;
use pitwall_core::metrics::METRICS;
use pitwall_core::obs::{
    emit_allocation_computed, emit_notification_failed, emit_thread_replaced, RaceSpan,
};
use pitwall_core::{Actor, CoordinatorConfig, RaceCoordinator};
use pitwall_state::fakes::MemoryLeagueStore;
use pitwall_state::storage_traits::*;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn allocation_event_carries_counts() {
    emit_allocation_computed("race-7", "gt3", 3, 8);
    assert!(logs_contain("allocation.computed"));
    assert!(logs_contain("teams=3"));
}

#[traced_test]
#[test]
fn notification_failure_is_a_warning() {
    emit_notification_failed("race-7", "status", &"gateway timeout");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("notification.failed"));
    assert!(logs_contain("gateway timeout"));
}

#[traced_test]
#[test]
fn thread_replacement_names_both_handles() {
    emit_thread_replaced("thread-old", "thread-new", 2);
    assert!(logs_contain("thread.replaced"));
    assert!(logs_contain("thread-old"));
    assert!(logs_contain("thread-new"));
}

#[traced_test]
#[test]
fn race_span_tags_nested_events() {
    let _span = RaceSpan::enter("race-span-1");
    tracing::info!("inside race span");
    assert!(logs_contain("race_id=race-span-1"));
}

#[test]
fn metrics_counters_accumulate() {
    let before = METRICS.status_edits();
    METRICS.inc_status_edits();
    assert!(METRICS.status_edits() > before);
}

#[traced_test]
#[tokio::test]
async fn notify_cycle_emits_pipeline_events() {
    let store = Arc::new(MemoryLeagueStore::new());
    let start = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
    let mut race = RaceRecord::new("race-obs", "event-obs", start);
    race.max_drivers_per_team = Some(2);
    store.save_race(race).await.unwrap();
    store.save_team(TeamRecord::new("team-a", "Apex")).await.unwrap();
    store.insert_registrations([RegistrationRecord::new(
        "reg-1",
        &RaceId::from("race-obs"),
        Driver::user("user-1", "Alice"),
        &CarClassId::from("gt3"),
        start,
    )]);

    let coordinator = RaceCoordinator::new(
        store,
        Arc::new(MemoryChatService::new()),
        CoordinatorConfig::default(),
    );
    let race_id = RaceId::from("race-obs");
    coordinator
        .rebalance_race(&Actor::admin("admin"), &race_id)
        .await
        .unwrap();
    coordinator.notify_race(&race_id).await.unwrap();

    assert!(logs_contain("assignments.written"));
    assert!(logs_contain("changes.detected"));
    assert!(logs_contain("status.upserted"));
    assert!(logs_contain("race_id=race-obs"));
}
