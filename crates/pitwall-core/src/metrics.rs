//! Global atomic counters for Pitwall observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI command).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    assignments_written: AtomicU64,
    threads_recreated: AtomicU64,
    status_edits: AtomicU64,
    status_posts: AtomicU64,
    notification_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            assignments_written: AtomicU64::new(0),
            threads_recreated: AtomicU64::new(0),
            status_edits: AtomicU64::new(0),
            status_posts: AtomicU64::new(0),
            notification_failures: AtomicU64::new(0),
        }
    }

    /// Add committed registration writes.
    pub fn add_assignments_written(&self, count: u64) {
        self.assignments_written.fetch_add(count, Ordering::Relaxed);
        tracing::trace!(metric = "assignments_written", count, "counter incremented");
    }

    pub fn inc_threads_recreated(&self) {
        self.threads_recreated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "threads_recreated", "counter incremented");
    }

    pub fn inc_status_edits(&self) {
        self.status_edits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "status_edits", "counter incremented");
    }

    pub fn inc_status_posts(&self) {
        self.status_posts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "status_posts", "counter incremented");
    }

    pub fn inc_notification_failures(&self) {
        self.notification_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "notification_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a command, scheduler tick)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            assignments_written = self.assignments_written(),
            threads_recreated = self.threads_recreated(),
            status_edits = self.status_edits(),
            status_posts = self.status_posts(),
            notification_failures = self.notification_failures(),
        );
    }

    pub fn assignments_written(&self) -> u64 {
        self.assignments_written.load(Ordering::Relaxed)
    }

    pub fn threads_recreated(&self) -> u64 {
        self.threads_recreated.load(Ordering::Relaxed)
    }

    pub fn status_edits(&self) -> u64 {
        self.status_edits.load(Ordering::Relaxed)
    }

    pub fn status_posts(&self) -> u64 {
        self.status_posts.load(Ordering::Relaxed)
    }

    pub fn notification_failures(&self) -> u64 {
        self.notification_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.assignments_written.store(0, Ordering::Relaxed);
        self.threads_recreated.store(0, Ordering::Relaxed);
        self.status_edits.store(0, Ordering::Relaxed);
        self.status_posts.store(0, Ordering::Relaxed);
        self.notification_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.add_assignments_written(3);
        m.add_assignments_written(2);
        assert_eq!(m.assignments_written(), 5);

        m.inc_threads_recreated();
        m.inc_status_edits();
        m.inc_status_edits();
        m.inc_status_posts();
        m.inc_notification_failures();
        assert_eq!(m.threads_recreated(), 1);
        assert_eq!(m.status_edits(), 2);
        assert_eq!(m.status_posts(), 1);
        assert_eq!(m.notification_failures(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.add_assignments_written(4);
        m.inc_threads_recreated();
        m.inc_status_posts();
        m.reset();
        assert_eq!(m.assignments_written(), 0);
        assert_eq!(m.threads_recreated(), 0);
        assert_eq!(m.status_posts(), 0);
    }
}
