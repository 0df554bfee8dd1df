//! Global atomic counters for Flakeguard observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event (the daemon does so on shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    runs_ingested: AtomicU64,
    classifier_passes: AtomicU64,
    exclusion_changes: AtomicU64,
    guardrail_rejections: AtomicU64,
    tickets_created: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_ingested: AtomicU64::new(0),
            classifier_passes: AtomicU64::new(0),
            exclusion_changes: AtomicU64::new(0),
            guardrail_rejections: AtomicU64::new(0),
            tickets_created: AtomicU64::new(0),
        }
    }

    pub fn add_runs_ingested(&self, n: u64) {
        self.runs_ingested.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "runs_ingested", "counter incremented");
    }

    pub fn inc_classifier_passes(&self) {
        self.classifier_passes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "classifier_passes", "counter incremented");
    }

    pub fn inc_exclusion_changes(&self) {
        self.exclusion_changes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "exclusion_changes", "counter incremented");
    }

    pub fn inc_guardrail_rejections(&self) {
        self.guardrail_rejections.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "guardrail_rejections", "counter incremented");
    }

    pub fn inc_tickets_created(&self) {
        self.tickets_created.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tickets_created", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_ingested = self.runs_ingested(),
            classifier_passes = self.classifier_passes(),
            exclusion_changes = self.exclusion_changes(),
            guardrail_rejections = self.guardrail_rejections(),
            tickets_created = self.tickets_created(),
        );
    }

    pub fn runs_ingested(&self) -> u64 {
        self.runs_ingested.load(Ordering::Relaxed)
    }

    pub fn classifier_passes(&self) -> u64 {
        self.classifier_passes.load(Ordering::Relaxed)
    }

    pub fn exclusion_changes(&self) -> u64 {
        self.exclusion_changes.load(Ordering::Relaxed)
    }

    pub fn guardrail_rejections(&self) -> u64 {
        self.guardrail_rejections.load(Ordering::Relaxed)
    }

    pub fn tickets_created(&self) -> u64 {
        self.tickets_created.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.runs_ingested.store(0, Ordering::Relaxed);
        self.classifier_passes.store(0, Ordering::Relaxed);
        self.exclusion_changes.store(0, Ordering::Relaxed);
        self.guardrail_rejections.store(0, Ordering::Relaxed);
        self.tickets_created.store(0, Ordering::Relaxed);
    }
}
