//! Limits on how many tests may be suppressed.
//!
//! User-initiated exclusions are checked with [`check_exclusion`] and
//! rejected before anything is persisted. Automatic decisions are audited
//! with [`audit`] and only flagged.

use flakeguard_state::{Guardrails, TestRecord};

use crate::domain::GuardrailViolation;

/// Denominator for the percentage rule: the declared test count, or the
/// number of known tests when that is larger.
pub fn suite_size(declared: u32, known_tests: usize) -> u32 {
    declared.max(u32::try_from(known_tests).unwrap_or(u32::MAX))
}

fn percentage(excluded: u32, suite_size: u32) -> Option<f64> {
    (suite_size > 0).then(|| f64::from(excluded) * 100.0 / f64::from(suite_size))
}

/// Check a proposed change from `before` to `after`.
///
/// `excluded_elsewhere` counts currently excluded tests of the repository
/// other than this one. A change that does not newly exclude the test is
/// always allowed.
pub fn check_exclusion(
    guardrails: &Guardrails,
    suite_size: u32,
    excluded_elsewhere: usize,
    before: &TestRecord,
    after: &TestRecord,
) -> Result<(), GuardrailViolation> {
    if !after.excluded || before.excluded {
        return Ok(());
    }

    if guardrails.require_jira_ticket && after.manual_override && after.jira_ticket.is_none() {
        return Err(GuardrailViolation::TicketRequired {
            test_id: after.id.0.clone(),
        });
    }

    let resulting = u32::try_from(excluded_elsewhere + 1).unwrap_or(u32::MAX);
    if resulting > guardrails.max_excluded_tests {
        return Err(GuardrailViolation::MaxExcludedTests {
            limit: guardrails.max_excluded_tests,
            resulting,
        });
    }

    if let Some(pct) = percentage(resulting, suite_size) {
        if pct > guardrails.max_excluded_tests_percentage {
            return Err(GuardrailViolation::MaxExcludedPercentage {
                limit: guardrails.max_excluded_tests_percentage,
                resulting: pct,
            });
        }
    }

    Ok(())
}

/// Every count-based guardrail the current exclusion state breaches.
pub fn audit(guardrails: &Guardrails, suite_size: u32, excluded: usize) -> Vec<GuardrailViolation> {
    let mut flags = Vec::new();
    let excluded = u32::try_from(excluded).unwrap_or(u32::MAX);

    if excluded > guardrails.max_excluded_tests {
        flags.push(GuardrailViolation::MaxExcludedTests {
            limit: guardrails.max_excluded_tests,
            resulting: excluded,
        });
    }
    if let Some(pct) = percentage(excluded, suite_size) {
        if pct > guardrails.max_excluded_tests_percentage {
            flags.push(GuardrailViolation::MaxExcludedPercentage {
                limit: guardrails.max_excluded_tests_percentage,
                resulting: pct,
            });
        }
    }
    flags
}
