//! Threshold reconciliation: rates + thresholds + manual overrides → the
//! effective exclusion state of a test.
//!
//! Invariant maintained by every function here: `manual_override` is true
//! exactly when `excluded` differs from [`auto_excluded`].

use serde::Serialize;

use flakeguard_state::{GlobalSettings, RepositoryRecord, TestRecord};

use crate::domain::ExclusionReason;
use crate::tiers;

/// Where an effective threshold came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdSource {
    Repository,
    Recommendation,
    Request,
}

/// Thresholds actually applied to a repository's tests, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveThresholds {
    pub flake_threshold: f64,
    pub failure_threshold: f64,
    pub flake_source: ThresholdSource,
    pub failure_source: ThresholdSource,
}

impl EffectiveThresholds {
    /// Repository thresholds, falling back to the size-tier recommendation.
    pub fn resolve(repo: &RepositoryRecord, settings: &GlobalSettings) -> Self {
        let rec = tiers::recommend(repo.test_count, settings);
        let (flake_threshold, flake_source) = match repo.flake_threshold {
            Some(t) => (t, ThresholdSource::Repository),
            None => (rec.flake_threshold, ThresholdSource::Recommendation),
        };
        let (failure_threshold, failure_source) = match repo.failure_threshold {
            Some(t) => (t, ThresholdSource::Repository),
            None => (rec.failure_threshold, ThresholdSource::Recommendation),
        };
        Self {
            flake_threshold,
            failure_threshold,
            flake_source,
            failure_source,
        }
    }

    /// Replace thresholds with per-request values where given.
    pub fn with_overrides(mut self, flake: Option<f64>, failure: Option<f64>) -> Self {
        if let Some(t) = flake {
            self.flake_threshold = t;
            self.flake_source = ThresholdSource::Request;
        }
        if let Some(t) = failure {
            self.failure_threshold = t;
            self.failure_source = ThresholdSource::Request;
        }
        self
    }

    /// Threshold-only decision for `test`.
    pub fn auto_excluded(&self, test: &TestRecord) -> bool {
        auto_excluded(test.flake_rate, test.failure_rate, self)
    }

    /// Which threshold a test breaches, flake first.
    pub fn breach(&self, test: &TestRecord) -> Option<ExclusionReason> {
        if exceeds(test.flake_rate, self.flake_threshold) {
            Some(ExclusionReason::FlakeThreshold)
        } else if exceeds(test.failure_rate, self.failure_threshold) {
            Some(ExclusionReason::FailureThreshold)
        } else {
            None
        }
    }
}

/// Strict comparison: a rate equal to its threshold does not exclude.
pub fn exceeds(rate: f64, threshold: f64) -> bool {
    rate > threshold
}

/// `flakeRate > flakeThreshold || failureRate > failureThreshold`
pub fn auto_excluded(flake_rate: f64, failure_rate: f64, thresholds: &EffectiveThresholds) -> bool {
    exceeds(flake_rate, thresholds.flake_threshold)
        || exceeds(failure_rate, thresholds.failure_threshold)
}

/// Set `test` to `desired`, recording an override when that disagrees with
/// the automatic decision. Returns the automatic decision.
pub fn apply_exclusion(test: &mut TestRecord, desired: bool, thresholds: &EffectiveThresholds) -> bool {
    let auto = thresholds.auto_excluded(test);
    test.excluded = desired;
    test.manual_override = desired != auto;
    auto
}

/// Re-apply thresholds after rates or thresholds changed.
///
/// Tests without an override follow the automatic decision. Overridden tests
/// keep `excluded`; their override flag is recomputed, so an override that
/// now agrees with the thresholds dissolves. Returns whether anything changed.
pub fn reconcile(test: &mut TestRecord, thresholds: &EffectiveThresholds) -> bool {
    let before = (test.excluded, test.manual_override);
    let auto = thresholds.auto_excluded(test);
    if test.manual_override {
        test.manual_override = test.excluded != auto;
    } else {
        test.excluded = auto;
    }
    before != (test.excluded, test.manual_override)
}

/// Whether `test` belongs on the exclusion list.
///
/// An override is authoritative: `manual_override && !excluded` never
/// appears, `manual_override && excluded` always does. Otherwise the
/// thresholds decide, which lets callers pass per-request thresholds.
pub fn exclusion_reason(test: &TestRecord, thresholds: &EffectiveThresholds) -> Option<ExclusionReason> {
    if test.manual_override {
        return test.excluded.then_some(ExclusionReason::ManualOverride);
    }
    thresholds.breach(test)
}
