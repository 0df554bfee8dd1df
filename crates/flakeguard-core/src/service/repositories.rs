//! Repository onboarding, thresholds, dashboard and global settings.

use std::collections::HashSet;

use chrono::Utc;
use serde_json::Value;
use tracing::{info, Instrument};

use flakeguard_state::{GlobalSettings, RepositoryRecord, VerdictRecord};

use super::{repo_key, FlakeService};
use crate::domain::{
    CreateRepositoryRequest, RepositoryDashboard, Result, ThresholdUpdate,
    ThresholdUpdateResponse, ValidationError,
};
use crate::guardrails::{audit, suite_size};
use crate::obs;
use crate::thresholds::EffectiveThresholds;
use crate::tiers;
use crate::validation::{
    parse_threshold, parse_time_period, validate_classifier, validate_settings,
};

/// `None` when absent, `Some(None)` for an explicit `null`.
fn nullable_threshold(
    field: &str,
    raw: Option<&Value>,
    errors: &mut ValidationError,
) -> Option<Option<f64>> {
    match raw {
        None => None,
        Some(Value::Null) => Some(None),
        Some(value) => match parse_threshold(field, value) {
            Ok(t) => Some(Some(t)),
            Err(err) => {
                errors.errors.push(err);
                None
            }
        },
    }
}

fn nullable_text(
    field: &str,
    raw: Option<&Value>,
    errors: &mut ValidationError,
) -> Option<Option<String>> {
    match raw {
        None => None,
        Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(non_blank(s)),
        Some(_) => {
            errors.push(field, "must be a string or null");
            None
        }
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn check_time_period(tag: &str, errors: &mut ValidationError) -> Option<String> {
    match parse_time_period(tag) {
        Ok(_) => Some(tag.trim().to_ascii_lowercase()),
        Err(err) => {
            errors.errors.push(err);
            None
        }
    }
}

fn check_name_part(field: &str, value: &str, errors: &mut ValidationError) {
    let value = value.trim();
    if value.is_empty() {
        errors.push(field, "is required");
    } else if value.contains('/') {
        errors.push(field, "must not contain '/'");
    }
}

impl FlakeService {
    pub async fn list_repositories(&self) -> Result<Vec<RepositoryRecord>> {
        Ok(self.store.list_repositories().await?)
    }

    pub async fn get_repository(&self, reference: &str) -> Result<RepositoryRecord> {
        self.resolve_repository(reference).await
    }

    /// Onboard a repository. Unset thresholds follow the size-tier
    /// recommendation.
    pub async fn create_repository(
        &self,
        req: &CreateRepositoryRequest,
    ) -> Result<RepositoryRecord> {
        let mut errors = ValidationError::default();
        check_name_part("owner", &req.owner, &mut errors);
        check_name_part("name", &req.name, &mut errors);
        let flake = nullable_threshold("flakeThreshold", req.flake_threshold.as_ref(), &mut errors);
        let failure =
            nullable_threshold("failureThreshold", req.failure_threshold.as_ref(), &mut errors);
        let time_period = check_time_period(
            req.time_period.as_deref().unwrap_or("14d"),
            &mut errors,
        );
        errors.into_result()?;

        let mut repo = RepositoryRecord::new(req.owner.trim(), req.name.trim());
        repo.description = req.description.as_deref().and_then(non_blank);
        repo.test_count = req.test_count.unwrap_or(0);
        repo.flake_threshold = flake.flatten();
        repo.failure_threshold = failure.flatten();
        repo.default_jira_board = req.default_jira_board.as_deref().and_then(non_blank);
        if let Some(tag) = time_period {
            repo.time_period = tag;
        }

        let repo = self.store.create_repository(repo).await?;
        info!(repository = %repo.full_name(), id = %repo.id, "repository onboarded");
        Ok(repo)
    }

    /// Validate and persist new thresholds, then re-apply them to every
    /// test. A changed analysis window or classifier tuning re-runs the
    /// classifier first.
    pub async fn update_thresholds(
        &self,
        reference: &str,
        update: &ThresholdUpdate,
    ) -> Result<ThresholdUpdateResponse> {
        let mut errors = ValidationError::default();
        let flake = nullable_threshold(
            "flakeThreshold",
            update.flake_threshold.as_ref(),
            &mut errors,
        );
        let failure = nullable_threshold(
            "failureThreshold",
            update.failure_threshold.as_ref(),
            &mut errors,
        );
        let board = nullable_text(
            "defaultJiraBoard",
            update.default_jira_board.as_ref(),
            &mut errors,
        );
        let time_period = update
            .time_period
            .as_deref()
            .and_then(|tag| check_time_period(tag, &mut errors));
        if let Some(classifier) = &update.classifier {
            validate_classifier(classifier, &mut errors);
        }
        errors.into_result()?;

        let repo = self.resolve_repository(reference).await?;
        let span = obs::repository_span(&repo.full_name());
        let _repo_guard = self.locks.lock(&repo_key(&repo.id)).await;
        let mut repo = self.store.get_repository(&repo.id).await?;

        let mut reanalyze = false;
        if let Some(t) = flake {
            repo.flake_threshold = t;
        }
        if let Some(t) = failure {
            repo.failure_threshold = t;
        }
        if let Some(b) = board {
            repo.default_jira_board = b;
        }
        if let Some(tag) = time_period {
            reanalyze |= tag != repo.time_period;
            repo.time_period = tag;
        }
        if let Some(classifier) = update.classifier {
            reanalyze |= classifier != repo.classifier;
            repo.classifier = classifier;
        }
        let now = Utc::now();
        repo.updated_at = now;
        self.store.update_repository(&repo).await?;

        let recalculation = if reanalyze {
            self.analyze_locked(repo.clone(), now)
                .instrument(span)
                .await?
                .recalculation
        } else {
            let settings = self.store.load_settings().await?;
            let thresholds = EffectiveThresholds::resolve(&repo, &settings);
            let tests = self.store.list_tests(&repo.id).await?;
            self.reconcile_all(&repo, &settings, &thresholds, tests, &HashSet::new(), now)
                .await?
                .0
        };

        // Analysis may have raised the test count.
        let repo = self.store.get_repository(&repo.id).await?;
        let settings = self.store.load_settings().await?;
        info!(
            repository = %repo.full_name(),
            tests_changed = recalculation.tests_changed,
            excluded = recalculation.excluded_tests,
            "thresholds updated"
        );
        Ok(ThresholdUpdateResponse {
            thresholds: EffectiveThresholds::resolve(&repo, &settings),
            repository: repo,
            recalculation,
        })
    }

    /// Everything the repository page shows. Refreshes the ticket cache
    /// first when it is stale; lookup failures are logged and ignored.
    pub async fn dashboard(&self, reference: &str) -> Result<RepositoryDashboard> {
        let repo = self.resolve_repository(reference).await?;
        let mut tests = self.store.list_tests(&repo.id).await?;

        if self.ticket_cache_stale(&repo, &tests, Utc::now()) {
            match self.refresh_tickets_for(&repo).await {
                Ok(summary) if summary.tests_linked > 0 || summary.tests_checked > 0 => {
                    tests = self.store.list_tests(&repo.id).await?;
                }
                Ok(_) => {}
                Err(err) => obs::emit_ticket_lookup_failed(&repo.full_name(), &err),
            }
        }

        let settings = self.store.load_settings().await?;
        let thresholds = EffectiveThresholds::resolve(&repo, &settings);
        let recommendation = tiers::recommend(repo.test_count, &settings);
        let excluded_count = tests.iter().filter(|t| t.excluded).count();
        let guardrail_flags = audit(
            &settings.guardrails,
            suite_size(repo.test_count, tests.len()),
            excluded_count,
        );

        Ok(RepositoryDashboard {
            repository: repo,
            thresholds,
            recommendation,
            tests,
            excluded_count,
            guardrail_flags,
        })
    }

    pub async fn list_verdicts(&self, reference: &str) -> Result<Vec<VerdictRecord>> {
        let repo = self.resolve_repository(reference).await?;
        Ok(self.store.list_verdicts(&repo.id).await?)
    }

    pub async fn get_settings(&self) -> Result<GlobalSettings> {
        Ok(self.store.load_settings().await?)
    }

    /// Replace the global settings and reconcile every repository, since
    /// recommendations feed the effective thresholds.
    pub async fn put_settings(&self, settings: GlobalSettings) -> Result<GlobalSettings> {
        validate_settings(&settings)?;
        self.store.save_settings(&settings).await?;

        let now = Utc::now();
        for repo in self.store.list_repositories().await? {
            let _repo_guard = self.locks.lock(&repo_key(&repo.id)).await;
            let repo = self.store.get_repository(&repo.id).await?;
            let thresholds = EffectiveThresholds::resolve(&repo, &settings);
            let tests = self.store.list_tests(&repo.id).await?;
            let (summary, _) = self
                .reconcile_all(&repo, &settings, &thresholds, tests, &HashSet::new(), now)
                .await?;
            if summary.tests_changed > 0 {
                info!(
                    repository = %repo.full_name(),
                    tests_changed = summary.tests_changed,
                    "settings change re-applied"
                );
            }
        }
        Ok(settings)
    }
}
