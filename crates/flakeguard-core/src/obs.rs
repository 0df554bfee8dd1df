//! Structured observability hooks for Flakeguard lifecycle events.
//!
//! Each function emits one event with a stable `event` field so log
//! pipelines can filter on it, e.g. `event = "exclusion.toggled"`.

use tracing::{info, warn};

use crate::domain::GuardrailViolation;

/// Span tagging everything logged during an operation with the repository
/// it concerns. Attach with `tracing::Instrument`.
pub fn repository_span(repository: &str) -> tracing::Span {
    tracing::info_span!("flakeguard.repository", repository = %repository)
}

/// Emit event: a result batch was accepted.
pub fn emit_ingest_received(repository: &str, runs: usize, registered: bool) {
    info!(
        event = "ingest.received",
        repository = %repository,
        runs = runs,
        registered = registered,
    );
}

/// Emit event: a classifier pass finished.
pub fn emit_classifier_finished(repository: &str, evaluated: usize, flaky: usize, duration_ms: u64) {
    info!(
        event = "classifier.finished",
        repository = %repository,
        evaluated = evaluated,
        flaky = flaky,
        duration_ms = duration_ms,
    );
}

/// Emit event: a user changed a test's exclusion.
pub fn emit_exclusion_toggled(test_id: &str, excluded: bool, manual_override: bool) {
    info!(
        event = "exclusion.toggled",
        test_id = %test_id,
        excluded = excluded,
        manual_override = manual_override,
    );
}

/// Emit event: a guardrail was breached. `enforced` is false when the
/// breach was only flagged.
pub fn emit_guardrail_violated(repository: &str, violation: &GuardrailViolation, enforced: bool) {
    warn!(
        event = "guardrail.violated",
        repository = %repository,
        violation = %violation,
        enforced = enforced,
    );
}

/// Emit event: a ticket was filed for a test.
pub fn emit_ticket_created(test_id: &str, key: &str) {
    info!(event = "ticket.created", test_id = %test_id, key = %key);
}

/// Emit event: an opportunistic ticket lookup failed and was ignored.
pub fn emit_ticket_lookup_failed(repository: &str, error: &dyn std::fmt::Display) {
    warn!(event = "ticket.lookup_failed", repository = %repository, error = %error);
}
