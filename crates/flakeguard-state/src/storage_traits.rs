//! Storage trait definitions for Flakeguard
//!
//! These traits define the storage abstractions:
//! - `RunRecordStore`: immutable per-execution test results
//! - `RepositoryStore`: onboarded repositories and their thresholds
//! - `TestStore`: per-test health and exclusion state
//! - `VerdictStore`: latest flakiness verdict per test
//! - `SettingsStore`: the process-wide settings row
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

fn short_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())[..16].to_string()
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable repository identifier derived from `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(pub String);

impl RepositoryId {
    /// Derive the id for a repository. Case-insensitive in owner and name.
    pub fn derive(owner: &str, name: &str) -> Self {
        RepositoryId(short_digest(&[
            &owner.trim().to_ascii_lowercase(),
            &name.trim().to_ascii_lowercase(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable test identifier derived from (repository, spec file, test name).
///
/// The same triple always maps to the same id, so re-ingesting results for a
/// test updates the existing record instead of creating a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(pub String);

impl TestId {
    pub fn derive(repository_id: &RepositoryId, spec_file: &str, test_name: &str) -> Self {
        TestId(short_digest(&[repository_id.as_str(), spec_file, test_name]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Run records
// ---------------------------------------------------------------------------

/// Outcome of one test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Passed,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" | "pass" => Ok(RunStatus::Passed),
            "failed" | "fail" => Ok(RunStatus::Failed),
            "skipped" | "pending" => Ok(RunStatus::Skipped),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution outcome. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunRecord {
    pub repository_id: RepositoryId,
    pub test_name: String,
    pub spec_file: String,
    pub status: RunStatus,
    pub commit_sha: String,
    pub branch: String,
    pub run_id: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable run record store.
///
/// Guarantees:
/// - Appended runs are never mutated.
/// - `list_runs` returns every run of the repository created at or after
///   `since` (all runs when `since` is `None`), in no particular order.
#[async_trait]
pub trait RunRecordStore: Send + Sync {
    /// Append a batch of runs. Returns the number of runs written.
    async fn append_runs(&self, runs: &[TestRunRecord]) -> StorageResult<usize>;

    /// List runs for a repository, optionally bounded by creation time.
    async fn list_runs(
        &self,
        repository_id: &RepositoryId,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<TestRunRecord>>;
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Per-repository classifier tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierSettings {
    /// Minimum runs in the window before a test is evaluated at all.
    pub minimum_runs: u32,
    /// Minimum number of flaky commit-groups for a flaky verdict (inclusive).
    pub flakiness_threshold: u32,
    /// Most-recent runs considered per test.
    pub max_runs_considered: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            minimum_runs: 5,
            flakiness_threshold: 1,
            max_runs_considered: 20,
        }
    }
}

/// An onboarded repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub id: RepositoryId,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub test_count: u32,
    /// Percent (0-100). `None` falls back to the size-tier recommendation.
    #[serde(default)]
    pub flake_threshold: Option<f64>,
    /// Percent (0-100). `None` falls back to the size-tier recommendation.
    #[serde(default)]
    pub failure_threshold: Option<f64>,
    #[serde(default)]
    pub default_jira_board: Option<String>,
    /// Analysis window tag such as `7d` or `2w`.
    pub time_period: String,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RepositoryRecord {
    /// Create a repository with default thresholds and a 14 day window.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        let now = Utc::now();
        Self {
            id: RepositoryId::derive(&owner, &name),
            owner,
            name,
            description: None,
            test_count: 0,
            flake_threshold: None,
            failure_threshold: None,
            default_jira_board: None,
            time_period: "14d".to_string(),
            classifier: ClassifierSettings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Repository registry.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Register a repository. Fails with `Conflict` if the id already exists.
    async fn create_repository(&self, repo: RepositoryRecord) -> StorageResult<RepositoryRecord>;

    /// Fetch a repository. Fails with `RepositoryNotFound` if absent.
    async fn get_repository(&self, id: &RepositoryId) -> StorageResult<RepositoryRecord>;

    /// Look a repository up by name, optionally qualified by owner.
    async fn find_repository(
        &self,
        owner: Option<&str>,
        name: &str,
    ) -> StorageResult<Option<RepositoryRecord>>;

    /// All repositories, ordered by `owner/name`.
    async fn list_repositories(&self) -> StorageResult<Vec<RepositoryRecord>>;

    /// Overwrite an existing repository. Fails with `RepositoryNotFound` if absent.
    async fn update_repository(&self, repo: &RepositoryRecord) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// Reference to an issue-tracker ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JiraTicketRef {
    pub key: String,
    pub url: String,
}

/// Health and exclusion state of one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub id: TestId,
    pub repository_id: RepositoryId,
    pub name: String,
    pub file: String,
    /// Percent (0-100).
    pub flake_rate: f64,
    /// Percent (0-100).
    pub failure_rate: f64,
    pub excluded: bool,
    pub manual_override: bool,
    #[serde(default)]
    pub jira_ticket: Option<JiraTicketRef>,
    #[serde(default)]
    pub runs_considered: u32,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// Last time the ticket cache was reconciled with the issue tracker.
    #[serde(default)]
    pub ticket_checked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TestRecord {
    pub fn new(repository_id: RepositoryId, file: impl Into<String>, name: impl Into<String>) -> Self {
        let file = file.into();
        let name = name.into();
        Self {
            id: TestId::derive(&repository_id, &file, &name),
            repository_id,
            name,
            file,
            flake_rate: 0.0,
            failure_rate: 0.0,
            excluded: false,
            manual_override: false,
            jira_ticket: None,
            runs_considered: 0,
            last_run_at: None,
            ticket_checked_at: None,
            updated_at: Utc::now(),
        }
    }
}

/// Per-test state store.
///
/// Guarantees:
/// - `upsert_test` writes the whole record in one statement, so `excluded`
///   and `manual_override` are never observed half-updated.
#[async_trait]
pub trait TestStore: Send + Sync {
    /// Insert or replace a test record keyed by its id.
    async fn upsert_test(&self, test: &TestRecord) -> StorageResult<()>;

    /// Fetch a test. Fails with `TestNotFound` if absent.
    async fn get_test(&self, id: &TestId) -> StorageResult<TestRecord>;

    /// All tests of a repository, ordered by (file, name).
    async fn list_tests(&self, repository_id: &RepositoryId) -> StorageResult<Vec<TestRecord>>;
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Latest flakiness verdict for a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerdictRecord {
    pub repository_id: RepositoryId,
    pub test_name: String,
    pub spec_file: String,
    /// Flaky commit-groups / distinct commit-groups, in [0, 1].
    pub flakiness_rate: f64,
    /// Number of flaky commit-groups.
    pub occurrences: u32,
    #[serde(default)]
    pub flaky_commits: Vec<String>,
    #[serde(default)]
    pub runs_considered: u32,
    pub evaluated_at: DateTime<Utc>,
}

impl VerdictRecord {
    /// Id of the test this verdict describes.
    pub fn test_id(&self) -> TestId {
        TestId::derive(&self.repository_id, &self.spec_file, &self.test_name)
    }
}

/// Verdict store. A verdict supersedes any earlier verdict for the same
/// (repository, spec file, test name).
#[async_trait]
pub trait VerdictStore: Send + Sync {
    async fn upsert_verdict(&self, verdict: &VerdictRecord) -> StorageResult<()>;

    /// Drop the verdict for a test that is no longer flaky. Returns whether
    /// one existed.
    async fn remove_verdict(&self, test_id: &TestId) -> StorageResult<bool>;

    /// All verdicts of a repository, ordered by (spec file, test name).
    async fn list_verdicts(&self, repository_id: &RepositoryId)
        -> StorageResult<Vec<VerdictRecord>>;
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// A suggested threshold with its rationale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub threshold: f64,
    pub description: String,
}

impl Recommendation {
    fn new(threshold: f64, description: &str) -> Self {
        Self {
            threshold,
            description: description.to_string(),
        }
    }
}

/// Recommendations per repository size tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRecommendations {
    pub small: Recommendation,
    pub medium: Recommendation,
    pub large: Recommendation,
}

/// Test-count boundaries between size tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSizeThresholds {
    /// Repositories with fewer tests than this are `small`.
    pub small: u32,
    /// Repositories with fewer tests than this (and not small) are `medium`.
    pub medium: u32,
}

/// Limits on test suppression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guardrails {
    pub max_excluded_tests: u32,
    pub max_excluded_tests_percentage: f64,
    pub require_jira_ticket: bool,
}

/// Process-wide configuration. Exactly one row exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    pub flake_recommendations: TierRecommendations,
    pub failure_recommendations: TierRecommendations,
    pub repo_size_thresholds: RepoSizeThresholds,
    pub guardrails: Guardrails,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            flake_recommendations: TierRecommendations {
                small: Recommendation::new(
                    5.0,
                    "Small suites rerun quickly, so keep flaky tests on a short leash.",
                ),
                medium: Recommendation::new(
                    10.0,
                    "Medium suites tolerate occasional flakes before excluding.",
                ),
                large: Recommendation::new(
                    15.0,
                    "Large suites exclude only persistently flaky tests.",
                ),
            },
            failure_recommendations: TierRecommendations {
                small: Recommendation::new(10.0, "Exclude tests failing more than 1 in 10 runs."),
                medium: Recommendation::new(15.0, "Exclude tests failing more than 15% of runs."),
                large: Recommendation::new(20.0, "Exclude tests failing more than 1 in 5 runs."),
            },
            repo_size_thresholds: RepoSizeThresholds {
                small: 100,
                medium: 500,
            },
            guardrails: Guardrails {
                max_excluded_tests: 50,
                max_excluded_tests_percentage: 20.0,
                require_jira_ticket: false,
            },
        }
    }
}

/// Settings store. Loading before anything was saved yields the defaults.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self) -> StorageResult<GlobalSettings>;

    async fn save_settings(&self, settings: &GlobalSettings) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// Store: everything a request handler needs
// ---------------------------------------------------------------------------

/// Umbrella trait implemented by any backend that provides every store.
pub trait Store:
    RunRecordStore + RepositoryStore + TestStore + VerdictStore + SettingsStore
{
}

impl<T> Store for T where
    T: RunRecordStore + RepositoryStore + TestStore + VerdictStore + SettingsStore
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repository_id_is_case_insensitive() {
        assert_eq!(
            RepositoryId::derive("Acme", "Web-App"),
            RepositoryId::derive("acme", "web-app")
        );
        assert_ne!(
            RepositoryId::derive("acme", "web-app"),
            RepositoryId::derive("acme", "api")
        );
    }

    #[test]
    fn test_id_depends_on_file_and_name() {
        let repo = RepositoryId::derive("acme", "web");
        let a = TestId::derive(&repo, "cypress/e2e/login.cy.ts", "logs in");
        let b = TestId::derive(&repo, "cypress/e2e/login.cy.ts", "logs out");
        let c = TestId::derive(&repo, "cypress/e2e/other.cy.ts", "logs in");
        assert_eq!(a, TestId::derive(&repo, "cypress/e2e/login.cy.ts", "logs in"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn run_status_parses_aliases() {
        assert_eq!("passed".parse::<RunStatus>().unwrap(), RunStatus::Passed);
        assert_eq!("FAILED".parse::<RunStatus>().unwrap(), RunStatus::Failed);
        assert_eq!("pending".parse::<RunStatus>().unwrap(), RunStatus::Skipped);
        assert!("broken".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let test = TestRecord::new(RepositoryId::derive("acme", "web"), "a.cy.ts", "works");
        let json = serde_json::to_value(&test).unwrap();
        assert!(json.get("manualOverride").is_some());
        assert!(json.get("flakeRate").is_some());
        assert!(json.get("jiraTicket").is_some());
    }

    #[test]
    fn default_settings_have_ordered_tiers() {
        let s = GlobalSettings::default();
        assert!(s.repo_size_thresholds.small < s.repo_size_thresholds.medium);
        assert!(s.flake_recommendations.small.threshold <= s.flake_recommendations.large.threshold);
    }
}
