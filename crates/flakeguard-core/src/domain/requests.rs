//! Request and response shapes of the service operations.
//!
//! Field names are camelCase on the wire. Loosely-typed inputs (thresholds,
//! statuses) arrive as raw JSON and are checked by `crate::validation`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use flakeguard_state::{
    ClassifierSettings, JiraTicketRef, RepositoryRecord, TestRecord,
};

use super::error::GuardrailViolation;
use crate::thresholds::EffectiveThresholds;
use crate::tiers::TierRecommendation;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(Value::Null)`).
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// One test outcome as reported by CI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRecord {
    #[serde(default, alias = "title")]
    pub test_name: String,
    #[serde(default, alias = "file")]
    pub spec_file: String,
    #[serde(default, alias = "state")]
    pub status: String,
    /// Overrides the batch-level commit
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "duration")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
}

/// A batch of results for one repository.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// `name` or `owner/name`
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub commit_sha: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default, alias = "results", alias = "tests")]
    pub records: Vec<IngestRecord>,
}

/// Outcome of an ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub repository_id: String,
    pub repository_registered: bool,
    pub runs_stored: usize,
    /// Tests classified flaky by this ingestion's classifier pass
    pub flaky_tests: usize,
    /// Flaky tests that had no verdict before this ingestion
    pub newly_flaky_tests: usize,
    pub analysis: AnalysisSummary,
}

/// Result of re-running the classifier and reconciler for a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub runs_analyzed: usize,
    pub tests_evaluated: usize,
    pub flaky_tests: usize,
    pub newly_flaky_tests: usize,
    pub verdicts_cleared: usize,
    pub tests_updated: usize,
    pub excluded_tests: usize,
    /// Guardrails breached by automatic decisions; flagged, not enforced
    pub guardrail_flags: Vec<GuardrailViolation>,
}

// ---------------------------------------------------------------------------
// Exclusion
// ---------------------------------------------------------------------------

/// Why a test is on the exclusion list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExclusionReason {
    ManualOverride,
    FlakeThreshold,
    FailureThreshold,
}

/// One entry of the excluded-tests list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedTest {
    pub id: String,
    pub repository_id: String,
    pub name: String,
    pub file: String,
    pub flake_rate: f64,
    pub failure_rate: f64,
    /// Stored state; false only when listed under per-request thresholds
    pub excluded: bool,
    pub manual_override: bool,
    pub reason: ExclusionReason,
    pub jira_ticket: Option<JiraTicketRef>,
}

/// Excluded tests of one repository.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedTestsResponse {
    pub repository: String,
    pub thresholds: EffectiveThresholds,
    pub tests: Vec<ExcludedTest>,
}

/// Spec files to skip, as a Cypress glob.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecPatternResponse {
    pub repository: String,
    /// Empty when nothing is excluded
    pub pattern: String,
    pub spec_files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    #[serde(default)]
    pub test_id: String,
    pub current_excluded_state: bool,
}

/// State of a test after an exclusion change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionChange {
    pub test: TestRecord,
    pub auto_excluded: bool,
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Tickets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub test_id: String,
    /// Repository id, `name` or `owner/name`
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub board: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTicket {
    pub id: String,
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketResponse {
    pub ticket: CreatedTicket,
}

/// Outcome of a ticket-cache refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRefreshSummary {
    pub searched: bool,
    pub tickets_found: usize,
    pub tests_linked: usize,
    pub tests_checked: usize,
    /// Why no search ran, or why it failed
    pub skipped_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepositoryRequest {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub test_count: Option<u32>,
    #[serde(default)]
    pub default_jira_board: Option<String>,
    #[serde(default)]
    pub time_period: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub flake_threshold: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub failure_threshold: Option<Value>,
}

/// Partial update of repository thresholds and analysis settings.
///
/// An absent field is left unchanged; `null` for a threshold clears it so the
/// tier recommendation applies again.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdUpdate {
    #[serde(default, deserialize_with = "present")]
    pub flake_threshold: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub failure_threshold: Option<Value>,
    #[serde(default)]
    pub time_period: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub default_jira_board: Option<Value>,
    #[serde(default)]
    pub classifier: Option<ClassifierSettings>,
}

/// Outcome of re-applying thresholds to every test of a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationSummary {
    pub tests_checked: usize,
    pub tests_changed: usize,
    pub excluded_tests: usize,
    pub guardrail_flags: Vec<GuardrailViolation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdUpdateResponse {
    pub repository: RepositoryRecord,
    pub thresholds: EffectiveThresholds,
    pub recalculation: RecalculationSummary,
}

/// Everything the repository page shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDashboard {
    pub repository: RepositoryRecord,
    pub thresholds: EffectiveThresholds,
    pub recommendation: TierRecommendation,
    pub tests: Vec<TestRecord>,
    pub excluded_count: usize,
    pub guardrail_flags: Vec<GuardrailViolation>,
}
