//! Structured observability hooks for Pitwall race operations.
//!
//! This module provides:
//! - Race-scoped tracing spans via the `RaceSpan` RAII guard
//! - Emission functions for key pipeline events: allocation, writes, change
//!   detection, thread replacement, status delivery, notification failure
//!
//! Events are emitted at `info!` level (failures at `warn!`). For JSON output,
//! run the CLI with `--json`.

use tracing::{info, warn};

/// RAII guard that enters a race-scoped tracing span for the duration of an operation.
///
/// # Example
///
/// ```ignore
/// let _span = RaceSpan::enter("race-2026-04-12");
/// // all tracing calls are now associated with race_id = "race-2026-04-12"
/// ```
pub struct RaceSpan {
    _span: tracing::span::EnteredSpan,
}

impl RaceSpan {
    /// Create and enter a span tagged with the race_id.
    pub fn enter(race_id: &str) -> Self {
        let span = tracing::info_span!("pitwall.race", race_id = %race_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a team pool was computed for one class.
pub fn emit_allocation_computed(race_id: &str, car_class_id: &str, teams: usize, drivers: usize) {
    info!(
        event = "allocation.computed",
        race_id = %race_id,
        car_class_id = %car_class_id,
        teams = teams,
        drivers = drivers,
    );
}

/// Emit event: team assignments committed.
pub fn emit_assignments_written(race_id: &str, planned: usize, written: usize) {
    info!(
        event = "assignments.written",
        race_id = %race_id,
        planned = planned,
        written = written,
    );
}

/// Emit event: snapshot diff computed.
pub fn emit_changes_detected(race_id: &str, changes: usize, destructive: usize) {
    info!(
        event = "changes.detected",
        race_id = %race_id,
        changes = changes,
        destructive = destructive,
    );
}

/// Emit event: a vanished thread was replaced and its handle propagated.
pub fn emit_thread_replaced(old: &str, new: &str, races_updated: usize) {
    info!(
        event = "thread.replaced",
        old_thread = %old,
        new_thread = %new,
        races_updated = races_updated,
    );
}

/// Emit event: the status message was delivered (`edited`, `posted`, `recreated`).
pub fn emit_status_upserted(thread: &str, outcome: &str) {
    info!(event = "status.upserted", thread = %thread, outcome = %outcome);
}

/// Emit event: a chat step failed; the committed state is left as is (warning level).
pub fn emit_notification_failed(race_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "notification.failed",
        race_id = %race_id,
        stage = %stage,
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_race_span_create() {
        let _span = RaceSpan::enter("race-1");
    }
}
