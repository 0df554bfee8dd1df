//! Flakiness classifier.
//!
//! For each (test name, spec file) pair the classifier takes the most recent
//! runs, groups them by commit, and calls a commit-group flaky when the same
//! commit both passed and failed. A test is flaky when enough of its groups
//! are, unless a flaky group's commit edited the test's own spec file (a real
//! behavior change, not flakiness).
//!
//! Output is independent of input row order: recency ties on timestamp are
//! broken by run id, and verdicts are sorted by (spec file, test name).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use flakeguard_state::{
    ClassifierSettings, RepositoryRecord, RunStatus, TestRunRecord, VerdictRecord,
};

use crate::git::{same_file, SpecChangeDetector};

/// Bounded run window of one test, reduced to what the classifier needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TestWindow {
    pub spec_file: String,
    pub test_name: String,
    pub runs_considered: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Distinct commits in the window
    pub commit_groups: u32,
    /// Commits whose runs both passed and failed, sorted
    pub flaky_commits: Vec<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl TestWindow {
    /// Flaky commit-groups over distinct commit-groups, in [0, 1].
    pub fn flakiness_rate(&self) -> f64 {
        if self.commit_groups == 0 {
            return 0.0;
        }
        self.flaky_commits.len() as f64 / f64::from(self.commit_groups)
    }

    /// Failed over decided (passed + failed) runs, in percent. Skipped runs
    /// do not count.
    pub fn failure_rate_percent(&self) -> f64 {
        let decided = self.passed + self.failed;
        if decided == 0 {
            return 0.0;
        }
        f64::from(self.failed) / f64::from(decided) * 100.0
    }
}

/// Partition `runs` by test and reduce each to its most recent
/// `max_runs_considered` runs. Sorted by (spec file, test name).
pub fn build_windows(runs: &[TestRunRecord], max_runs_considered: u32) -> Vec<TestWindow> {
    let mut by_test: BTreeMap<(&str, &str), Vec<&TestRunRecord>> = BTreeMap::new();
    for run in runs {
        by_test
            .entry((run.spec_file.as_str(), run.test_name.as_str()))
            .or_default()
            .push(run);
    }

    by_test
        .into_iter()
        .map(|((spec_file, test_name), mut test_runs)| {
            test_runs.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.run_id.cmp(&a.run_id))
            });
            test_runs.truncate(max_runs_considered as usize);
            summarize(spec_file, test_name, &test_runs)
        })
        .collect()
}

fn summarize(spec_file: &str, test_name: &str, runs: &[&TestRunRecord]) -> TestWindow {
    let mut groups: BTreeMap<&str, BTreeSet<RunStatus>> = BTreeMap::new();
    let (mut passed, mut failed, mut skipped) = (0, 0, 0);
    for run in runs {
        match run.status {
            RunStatus::Passed => passed += 1,
            RunStatus::Failed => failed += 1,
            RunStatus::Skipped => skipped += 1,
        }
        groups.entry(run.commit_sha.as_str()).or_default().insert(run.status);
    }

    let flaky_commits = groups
        .iter()
        .filter(|(_, statuses)| {
            statuses.contains(&RunStatus::Passed) && statuses.contains(&RunStatus::Failed)
        })
        .map(|(sha, _)| sha.to_string())
        .collect();

    TestWindow {
        spec_file: spec_file.to_string(),
        test_name: test_name.to_string(),
        runs_considered: runs.len() as u32,
        passed,
        failed,
        skipped,
        commit_groups: groups.len() as u32,
        flaky_commits,
        last_run_at: runs.first().map(|r| r.created_at),
    }
}

/// Result of one classification pass.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Every test with at least `minimum_runs` runs in the window
    pub evaluated: Vec<TestWindow>,
    /// Tests judged flaky, sorted by (spec file, test name)
    pub verdicts: Vec<VerdictRecord>,
    /// Tests with fewer than `minimum_runs` runs
    pub skipped: usize,
    /// (spec file, test name) of flaky candidates discarded because a flaky
    /// commit edited the spec
    pub spec_changed: Vec<(String, String)>,
}

impl Classification {
    pub fn verdict_for(&self, spec_file: &str, test_name: &str) -> Option<&VerdictRecord> {
        self.verdicts
            .iter()
            .find(|v| v.spec_file == spec_file && v.test_name == test_name)
    }

    pub fn spec_changed(&self, spec_file: &str, test_name: &str) -> bool {
        self.spec_changed
            .iter()
            .any(|(f, n)| f == spec_file && n == test_name)
    }
}

/// Classifier bound to a spec-change detector.
pub struct FlakeClassifier<'a> {
    detector: &'a dyn SpecChangeDetector,
}

impl<'a> FlakeClassifier<'a> {
    pub fn new(detector: &'a dyn SpecChangeDetector) -> Self {
        Self { detector }
    }

    /// Classify the runs of `repo`.
    ///
    /// Detector answers are memoized per commit for the pass. A detector
    /// failure counts as "no spec changes" and is logged.
    pub async fn classify(
        &self,
        repo: &RepositoryRecord,
        runs: &[TestRunRecord],
        settings: &ClassifierSettings,
        now: DateTime<Utc>,
    ) -> Classification {
        let mut result = Classification::default();
        let required_groups = settings.flakiness_threshold.max(1) as usize;
        let mut changed_files: HashMap<String, Vec<String>> = HashMap::new();

        for window in build_windows(runs, settings.max_runs_considered) {
            if window.runs_considered < settings.minimum_runs || window.commit_groups == 0 {
                result.skipped += 1;
                continue;
            }

            if window.flaky_commits.len() >= required_groups
                && !self
                    .spec_changed_in_flaky_commit(repo, &window, &mut changed_files)
                    .await
            {
                result.verdicts.push(VerdictRecord {
                    repository_id: repo.id.clone(),
                    test_name: window.test_name.clone(),
                    spec_file: window.spec_file.clone(),
                    flakiness_rate: window.flakiness_rate(),
                    occurrences: window.flaky_commits.len() as u32,
                    flaky_commits: window.flaky_commits.clone(),
                    runs_considered: window.runs_considered,
                    evaluated_at: now,
                });
            } else if window.flaky_commits.len() >= required_groups {
                result
                    .spec_changed
                    .push((window.spec_file.clone(), window.test_name.clone()));
            }
            result.evaluated.push(window);
        }

        debug!(
            repository = %repo.full_name(),
            evaluated = result.evaluated.len(),
            flaky = result.verdicts.len(),
            skipped = result.skipped,
            "classification pass complete"
        );
        result
    }

    async fn spec_changed_in_flaky_commit(
        &self,
        repo: &RepositoryRecord,
        window: &TestWindow,
        cache: &mut HashMap<String, Vec<String>>,
    ) -> bool {
        for sha in &window.flaky_commits {
            if !cache.contains_key(sha) {
                let files = match self.detector.modified_files(&repo.owner, &repo.name, sha).await {
                    Ok(files) => files,
                    Err(err) => {
                        warn!(
                            repository = %repo.full_name(),
                            commit = %sha,
                            error = %err,
                            "spec-change check failed, assuming no changes"
                        );
                        Vec::new()
                    }
                };
                cache.insert(sha.clone(), files);
            }
            let touched = cache
                .get(sha)
                .is_some_and(|files| files.iter().any(|f| same_file(f, &window.spec_file)));
            if touched {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{NoChangeDetector, StaticChangeDetector};
    use chrono::Duration;
    use flakeguard_state::RepositoryId;

    fn repo() -> RepositoryRecord {
        RepositoryRecord::new("acme", "web")
    }

    fn run(test: &str, sha: &str, status: RunStatus, minute: i64) -> TestRunRecord {
        let base = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        TestRunRecord {
            repository_id: RepositoryId::derive("acme", "web"),
            test_name: test.to_string(),
            spec_file: "cypress/e2e/login.cy.ts".to_string(),
            status,
            commit_sha: sha.to_string(),
            branch: "main".to_string(),
            run_id: format!("run-{minute:03}"),
            duration_ms: None,
            error_message: None,
            stack_trace: None,
            created_at: base + Duration::minutes(minute),
        }
    }

    fn settings(minimum_runs: u32, flakiness_threshold: u32) -> ClassifierSettings {
        ClassifierSettings {
            minimum_runs,
            flakiness_threshold,
            max_runs_considered: 20,
        }
    }

    /// 5 runs on 3 commits, only `c2` mixed.
    fn five_runs_three_commits() -> Vec<TestRunRecord> {
        vec![
            run("logs in", "c1", RunStatus::Passed, 1),
            run("logs in", "c2", RunStatus::Passed, 2),
            run("logs in", "c2", RunStatus::Failed, 3),
            run("logs in", "c3", RunStatus::Passed, 4),
            run("logs in", "c3", RunStatus::Passed, 5),
        ]
    }

    #[tokio::test]
    async fn one_mixed_commit_of_three_is_flaky_at_one_third() {
        let detector = NoChangeDetector;
        let result = FlakeClassifier::new(&detector)
            .classify(&repo(), &five_runs_three_commits(), &settings(5, 1), Utc::now())
            .await;

        assert_eq!(result.verdicts.len(), 1);
        let v = &result.verdicts[0];
        assert!((v.flakiness_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(v.occurrences, 1);
        assert_eq!(v.flaky_commits, vec!["c2".to_string()]);
        assert_eq!(v.runs_considered, 5);
    }

    #[tokio::test]
    async fn fewer_than_minimum_runs_yields_no_verdict() {
        let detector = NoChangeDetector;
        let runs = &five_runs_three_commits()[..4];
        let result = FlakeClassifier::new(&detector)
            .classify(&repo(), runs, &settings(5, 1), Utc::now())
            .await;
        assert!(result.verdicts.is_empty());
        assert!(result.evaluated.is_empty());
        assert_eq!(result.skipped, 1);
    }

    #[tokio::test]
    async fn skipped_status_never_makes_a_group_flaky() {
        let detector = NoChangeDetector;
        let runs = vec![
            run("t", "c1", RunStatus::Passed, 1),
            run("t", "c1", RunStatus::Skipped, 2),
            run("t", "c2", RunStatus::Failed, 3),
            run("t", "c2", RunStatus::Skipped, 4),
            run("t", "c3", RunStatus::Skipped, 5),
        ];
        let result = FlakeClassifier::new(&detector)
            .classify(&repo(), &runs, &settings(5, 1), Utc::now())
            .await;
        assert!(result.verdicts.is_empty());
        assert_eq!(result.evaluated.len(), 1);
        assert_eq!(result.evaluated[0].failure_rate_percent(), 50.0);
    }

    #[tokio::test]
    async fn flakiness_threshold_is_inclusive() {
        let detector = NoChangeDetector;
        let mut runs = five_runs_three_commits();
        runs.push(run("logs in", "c3", RunStatus::Failed, 6));

        let at_two = FlakeClassifier::new(&detector)
            .classify(&repo(), &runs, &settings(5, 2), Utc::now())
            .await;
        assert_eq!(at_two.verdicts.len(), 1);
        assert_eq!(at_two.verdicts[0].occurrences, 2);

        let at_three = FlakeClassifier::new(&detector)
            .classify(&repo(), &runs, &settings(5, 3), Utc::now())
            .await;
        assert!(at_three.verdicts.is_empty());
    }

    #[tokio::test]
    async fn window_keeps_most_recent_runs() {
        let detector = NoChangeDetector;
        // Old mixed commit falls outside a 4-run window.
        let mut runs = vec![
            run("t", "old", RunStatus::Passed, 1),
            run("t", "old", RunStatus::Failed, 2),
        ];
        for m in 3..7 {
            runs.push(run("t", &format!("n{m}"), RunStatus::Passed, m));
        }
        let cfg = ClassifierSettings {
            minimum_runs: 4,
            flakiness_threshold: 1,
            max_runs_considered: 4,
        };
        let result = FlakeClassifier::new(&detector)
            .classify(&repo(), &runs, &cfg, Utc::now())
            .await;
        assert!(result.verdicts.is_empty());
        assert_eq!(result.evaluated[0].runs_considered, 4);
    }

    #[tokio::test]
    async fn result_is_independent_of_row_order() {
        let detector = NoChangeDetector;
        let mut runs = five_runs_three_commits();
        runs.extend([
            run("logs out", "c1", RunStatus::Failed, 1),
            run("logs out", "c1", RunStatus::Passed, 1),
            run("logs out", "c2", RunStatus::Passed, 2),
            run("logs out", "c2", RunStatus::Passed, 2),
            run("logs out", "c3", RunStatus::Passed, 3),
        ]);
        let classifier = FlakeClassifier::new(&detector);
        let now = Utc::now();
        let forward = classifier.classify(&repo(), &runs, &settings(5, 1), now).await;
        runs.reverse();
        let backward = classifier.classify(&repo(), &runs, &settings(5, 1), now).await;

        assert_eq!(forward.verdicts, backward.verdicts);
        assert_eq!(forward.verdicts.len(), 2);
        assert_eq!(forward.verdicts[0].test_name, "logs in");
    }

    #[tokio::test]
    async fn spec_edit_in_flaky_commit_discards_verdict() {
        let detector = StaticChangeDetector::new().with_change("c2", &["cypress/e2e/login.cy.ts"]);
        let result = FlakeClassifier::new(&detector)
            .classify(&repo(), &five_runs_three_commits(), &settings(5, 1), Utc::now())
            .await;
        assert!(result.verdicts.is_empty());
        assert!(result.spec_changed("cypress/e2e/login.cy.ts", "logs in"));
        assert_eq!(result.evaluated.len(), 1);
    }

    #[tokio::test]
    async fn unrelated_edit_keeps_verdict() {
        let detector = StaticChangeDetector::new().with_change("c2", &["src/app.ts"]);
        let result = FlakeClassifier::new(&detector)
            .classify(&repo(), &five_runs_three_commits(), &settings(5, 1), Utc::now())
            .await;
        assert_eq!(result.verdicts.len(), 1);
    }

    #[tokio::test]
    async fn detector_failure_fails_open() {
        let detector = StaticChangeDetector::new().with_failure("c2");
        let result = FlakeClassifier::new(&detector)
            .classify(&repo(), &five_runs_three_commits(), &settings(5, 1), Utc::now())
            .await;
        assert_eq!(result.verdicts.len(), 1);
    }

    #[test]
    fn windows_report_counts() {
        let windows = build_windows(&five_runs_three_commits(), 20);
        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!((w.passed, w.failed, w.skipped), (4, 1, 0));
        assert_eq!(w.commit_groups, 3);
        assert_eq!(w.failure_rate_percent(), 20.0);
        assert_eq!(w.last_run_at, Some(five_runs_three_commits()[4].created_at));
    }
}
