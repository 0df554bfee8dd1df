//! Exclusion list, manual toggles and bulk reconciliation.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use flakeguard_state::{GlobalSettings, RepositoryRecord, TestId, TestRecord};

use super::{repo_key, test_key, FlakeService};
use crate::domain::{
    ExcludedTest, ExcludedTestsResponse, ExclusionChange, FieldError, RecalculationSummary,
    Result, SpecPatternResponse, ToggleRequest, ValidationError,
};
use crate::guardrails::{audit, check_exclusion, suite_size};
use crate::metrics::METRICS;
use crate::obs;
use crate::thresholds::{apply_exclusion, exclusion_reason, reconcile, EffectiveThresholds};
use crate::validation::parse_threshold_param;

fn collect<T>(
    result: std::result::Result<Option<T>, FieldError>,
    errors: &mut ValidationError,
) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            errors.errors.push(err);
            None
        }
    }
}

/// Cypress `--spec` glob matching every file in `files`.
pub fn spec_pattern(files: &[String]) -> String {
    match files {
        [] => String::new(),
        [one] => one.clone(),
        many => format!("{{{}}}", many.join(",")),
    }
}

impl FlakeService {
    /// Tests to exclude: manual exclusions plus threshold breaches.
    ///
    /// Per-request thresholds replace the repository's for this listing
    /// only; overridden tests are listed by their stored state regardless.
    pub async fn excluded_tests(
        &self,
        reference: &str,
        flake_threshold: Option<&str>,
        failure_threshold: Option<&str>,
    ) -> Result<ExcludedTestsResponse> {
        let mut errors = ValidationError::default();
        let flake = collect(
            parse_threshold_param("flakeThreshold", flake_threshold),
            &mut errors,
        );
        let failure = collect(
            parse_threshold_param("failureThreshold", failure_threshold),
            &mut errors,
        );
        errors.into_result()?;

        let repo = self.resolve_repository(reference).await?;
        let settings = self.store.load_settings().await?;
        let thresholds =
            EffectiveThresholds::resolve(&repo, &settings).with_overrides(flake, failure);

        let tests = self
            .store
            .list_tests(&repo.id)
            .await?
            .into_iter()
            .filter_map(|t| {
                let reason = exclusion_reason(&t, &thresholds)?;
                Some(ExcludedTest {
                    id: t.id.0,
                    repository_id: t.repository_id.0,
                    name: t.name,
                    file: t.file,
                    flake_rate: t.flake_rate,
                    failure_rate: t.failure_rate,
                    excluded: t.excluded,
                    manual_override: t.manual_override,
                    reason,
                    jira_ticket: t.jira_ticket,
                })
            })
            .collect();

        Ok(ExcludedTestsResponse {
            repository: repo.full_name(),
            thresholds,
            tests,
        })
    }

    /// Spec files holding at least one excluded test, as one glob.
    pub async fn spec_exclusion_pattern(&self, reference: &str) -> Result<SpecPatternResponse> {
        let excluded = self.excluded_tests(reference, None, None).await?;
        let spec_files: Vec<String> = excluded
            .tests
            .into_iter()
            .map(|t| t.file)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(SpecPatternResponse {
            repository: excluded.repository,
            pattern: spec_pattern(&spec_files),
            spec_files,
        })
    }

    /// Flip a test relative to the state the caller last saw.
    pub async fn toggle(&self, req: &ToggleRequest) -> Result<ExclusionChange> {
        self.set_exclusion(&req.test_id, !req.current_excluded_state)
            .await
    }

    /// Set a test's exclusion, recording an override when the choice
    /// disagrees with the thresholds.
    ///
    /// Newly excluding a test is checked against the guardrails first and
    /// rejected without writing anything.
    pub async fn set_exclusion(&self, test_id: &str, desired: bool) -> Result<ExclusionChange> {
        let test = self.load_test(test_id, None).await?;
        let _repo_guard = self.locks.lock(&repo_key(&test.repository_id)).await;
        let _test_guard = self.locks.lock(&test_key(&test.id)).await;

        let before = self.store.get_test(&test.id).await?;
        let repo = self.store.get_repository(&before.repository_id).await?;
        let settings = self.store.load_settings().await?;
        let thresholds = EffectiveThresholds::resolve(&repo, &settings);

        let mut after = before.clone();
        let auto_excluded = apply_exclusion(&mut after, desired, &thresholds);
        if (before.excluded, before.manual_override) == (after.excluded, after.manual_override) {
            return Ok(ExclusionChange {
                test: before,
                auto_excluded,
                changed: false,
            });
        }

        if after.excluded && !before.excluded {
            let tests = self.store.list_tests(&repo.id).await?;
            let excluded_elsewhere = tests
                .iter()
                .filter(|t| t.excluded && t.id != after.id)
                .count();
            let size = suite_size(repo.test_count, tests.len());
            if let Err(violation) =
                check_exclusion(&settings.guardrails, size, excluded_elsewhere, &before, &after)
            {
                METRICS.inc_guardrail_rejections();
                obs::emit_guardrail_violated(&repo.full_name(), &violation, true);
                return Err(violation.into());
            }
        }

        after.updated_at = Utc::now();
        self.store.upsert_test(&after).await?;
        METRICS.inc_exclusion_changes();
        obs::emit_exclusion_toggled(after.id.as_str(), after.excluded, after.manual_override);

        Ok(ExclusionChange {
            test: after,
            auto_excluded,
            changed: true,
        })
    }

    /// Reconcile `tests` against `thresholds` and persist those that changed
    /// or are in `dirty`. Guardrail breaches are flagged, not enforced.
    /// Caller holds the repository lock. Returns the summary and the number
    /// of tests written.
    pub(super) async fn reconcile_all(
        &self,
        repo: &RepositoryRecord,
        settings: &GlobalSettings,
        thresholds: &EffectiveThresholds,
        tests: Vec<TestRecord>,
        dirty: &HashSet<TestId>,
        now: DateTime<Utc>,
    ) -> Result<(RecalculationSummary, usize)> {
        let mut summary = RecalculationSummary {
            tests_checked: tests.len(),
            ..Default::default()
        };
        let mut written = 0;

        for mut test in tests {
            let changed = reconcile(&mut test, thresholds);
            if changed {
                summary.tests_changed += 1;
            }
            if test.excluded {
                summary.excluded_tests += 1;
            }
            if changed || dirty.contains(&test.id) {
                test.updated_at = now;
                self.store.upsert_test(&test).await?;
                written += 1;
            }
        }

        let size = suite_size(repo.test_count, summary.tests_checked);
        summary.guardrail_flags = audit(&settings.guardrails, size, summary.excluded_tests);
        for flag in &summary.guardrail_flags {
            obs::emit_guardrail_violated(&repo.full_name(), flag, false);
        }
        Ok((summary, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_pattern_shapes() {
        assert_eq!(spec_pattern(&[]), "");
        assert_eq!(
            spec_pattern(&["cypress/e2e/a.cy.ts".to_string()]),
            "cypress/e2e/a.cy.ts"
        );
        assert_eq!(
            spec_pattern(&["a.cy.ts".to_string(), "b.cy.ts".to_string()]),
            "{a.cy.ts,b.cy.ts}"
        );
    }
}
