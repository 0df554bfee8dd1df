//! Result ingestion and the per-repository analysis pass.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, Instrument};
use uuid::Uuid;

use flakeguard_state::{
    RepositoryId, RepositoryRecord, StorageError, TestId, TestRecord, TestRunRecord,
};

use super::{repo_key, FlakeService};
use crate::classifier::{build_windows, FlakeClassifier};
use crate::domain::{
    AnalysisSummary, IngestRequest, IngestResponse, RecalculationSummary, Result, ValidationError,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::thresholds::EffectiveThresholds;
use crate::validation::{validate_ingest, window_start};

/// Both views of one analysis pass.
pub(super) struct AnalysisOutcome {
    pub analysis: AnalysisSummary,
    pub recalculation: RecalculationSummary,
}

impl FlakeService {
    /// Store a batch of results, then classify and reconcile the repository.
    ///
    /// A repository seen for the first time is registered, which needs an
    /// owner.
    pub async fn ingest(&self, req: &IngestRequest) -> Result<IngestResponse> {
        let now = Utc::now();
        let batch = validate_ingest(req, now)?;
        let (repo, registered) = self
            .repository_for_ingest(batch.owner.as_deref(), &batch.name)
            .await?;
        let span = obs::repository_span(&repo.full_name());

        let batch_run_id = Uuid::new_v4().to_string();
        let runs: Vec<TestRunRecord> = batch
            .runs
            .into_iter()
            .map(|mut run| {
                run.repository_id = repo.id.clone();
                if run.run_id.is_empty() {
                    run.run_id = batch_run_id.clone();
                }
                run
            })
            .collect();

        let _repo_guard = self.locks.lock(&repo_key(&repo.id)).await;
        let runs_stored = self.store.append_runs(&runs).await?;
        METRICS.add_runs_ingested(runs_stored as u64);
        obs::emit_ingest_received(&repo.full_name(), runs_stored, registered);

        let repo = self.store.get_repository(&repo.id).await?;
        let repository_id = repo.id.0.clone();
        let outcome = self.analyze_locked(repo, now).instrument(span).await?;

        Ok(IngestResponse {
            repository_id,
            repository_registered: registered,
            runs_stored,
            flaky_tests: outcome.analysis.flaky_tests,
            newly_flaky_tests: outcome.analysis.newly_flaky_tests,
            analysis: outcome.analysis,
        })
    }

    /// Re-run the classifier and reconciler without new results.
    pub async fn analyze_repository(&self, reference: &str) -> Result<AnalysisSummary> {
        let repo = self.resolve_repository(reference).await?;
        let span = obs::repository_span(&repo.full_name());
        let _repo_guard = self.locks.lock(&repo_key(&repo.id)).await;
        let repo = self.store.get_repository(&repo.id).await?;
        let outcome = self.analyze_locked(repo, Utc::now()).instrument(span).await?;
        Ok(outcome.analysis)
    }

    async fn repository_for_ingest(
        &self,
        owner: Option<&str>,
        name: &str,
    ) -> Result<(RepositoryRecord, bool)> {
        if let Some(repo) = self.store.find_repository(owner, name).await? {
            return Ok((repo, false));
        }
        let owner = owner.ok_or_else(|| {
            ValidationError::field("owner", "is required to register a new repository")
        })?;

        match self
            .store
            .create_repository(RepositoryRecord::new(owner, name))
            .await
        {
            Ok(repo) => {
                info!(repository = %repo.full_name(), id = %repo.id, "registered repository on first ingestion");
                Ok((repo, true))
            }
            // Registered concurrently by another batch.
            Err(StorageError::Conflict { .. }) => {
                let repo = self
                    .store
                    .get_repository(&RepositoryId::derive(owner, name))
                    .await?;
                Ok((repo, false))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Classify, refresh rates and verdicts, then reconcile every test.
    /// Caller holds the repository lock.
    pub(super) async fn analyze_locked(
        &self,
        mut repo: RepositoryRecord,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome> {
        let started = Instant::now();
        let settings = self.store.load_settings().await?;
        let since = window_start(&repo.time_period, now).map_err(|e| ValidationError {
            errors: vec![e],
        })?;
        let runs = self.store.list_runs(&repo.id, since).await?;

        let classification = FlakeClassifier::new(self.detector.as_ref())
            .classify(&repo, &runs, &repo.classifier, now)
            .await;
        METRICS.inc_classifier_passes();

        let mut tests: BTreeMap<TestId, TestRecord> = self
            .store
            .list_tests(&repo.id)
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        let evaluated: HashSet<(&str, &str)> = classification
            .evaluated
            .iter()
            .map(|w| (w.spec_file.as_str(), w.test_name.as_str()))
            .collect();

        // Tests without runs in the window keep their last rates.
        let mut dirty = HashSet::new();
        for window in build_windows(&runs, repo.classifier.max_runs_considered) {
            let id = TestId::derive(&repo.id, &window.spec_file, &window.test_name);
            let test = tests.entry(id.clone()).or_insert_with(|| {
                TestRecord::new(repo.id.clone(), &window.spec_file, &window.test_name)
            });
            let before = test.clone();

            if evaluated.contains(&(window.spec_file.as_str(), window.test_name.as_str())) {
                // Measured even below the flakiness threshold. Zero when a
                // flaky commit edited the spec.
                test.flake_rate =
                    if classification.spec_changed(&window.spec_file, &window.test_name) {
                        0.0
                    } else {
                        window.flakiness_rate() * 100.0
                    };
                test.failure_rate = window.failure_rate_percent();
            } else {
                test.flake_rate = 0.0;
                test.failure_rate = 0.0;
            }
            test.runs_considered = window.runs_considered;
            test.last_run_at = window.last_run_at;

            if *test != before {
                dirty.insert(id);
            }
        }

        let previously_flaky: HashSet<TestId> = self
            .store
            .list_verdicts(&repo.id)
            .await?
            .iter()
            .map(|v| TestId::derive(&repo.id, &v.spec_file, &v.test_name))
            .collect();
        let mut newly_flaky_tests = 0;
        for verdict in &classification.verdicts {
            let id = TestId::derive(&repo.id, &verdict.spec_file, &verdict.test_name);
            if !previously_flaky.contains(&id) {
                newly_flaky_tests += 1;
            }
            self.store.upsert_verdict(verdict).await?;
        }
        let mut verdicts_cleared = 0;
        for window in &classification.evaluated {
            if classification
                .verdict_for(&window.spec_file, &window.test_name)
                .is_none()
            {
                let id = TestId::derive(&repo.id, &window.spec_file, &window.test_name);
                if self.store.remove_verdict(&id).await? {
                    verdicts_cleared += 1;
                }
            }
        }

        let known = u32::try_from(tests.len()).unwrap_or(u32::MAX);
        if known > repo.test_count {
            repo.test_count = known;
            repo.updated_at = now;
            self.store.update_repository(&repo).await?;
        }

        let thresholds = EffectiveThresholds::resolve(&repo, &settings);
        let (recalculation, tests_updated) = self
            .reconcile_all(&repo, &settings, &thresholds, tests.into_values().collect(), &dirty, now)
            .await?;

        let analysis = AnalysisSummary {
            runs_analyzed: runs.len(),
            tests_evaluated: classification.evaluated.len(),
            flaky_tests: classification.verdicts.len(),
            newly_flaky_tests,
            verdicts_cleared,
            tests_updated,
            excluded_tests: recalculation.excluded_tests,
            guardrail_flags: recalculation.guardrail_flags.clone(),
        };
        obs::emit_classifier_finished(
            &repo.full_name(),
            analysis.tests_evaluated,
            analysis.flaky_tests,
            started.elapsed().as_millis() as u64,
        );

        Ok(AnalysisOutcome {
            analysis,
            recalculation,
        })
    }
}
