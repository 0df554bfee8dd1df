//! Row types for Flakeguard SurrealDB tables
//!
//! Tables:
//! - test_runs: immutable run records
//! - repositories: onboarded repositories (record key = repository id)
//! - tests: per-test state (record key = test id)
//! - flaky_verdicts: latest verdict per test (record key = test id)
//! - settings: single `settings:global` row
//!
//! Rows use snake_case columns and SurrealDB datetimes; conversion to the
//! `storage_traits` types happens at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    ClassifierSettings, GlobalSettings, JiraTicketRef, RepositoryId, RepositoryRecord, RunStatus,
    TestId, TestRecord, TestRunRecord, VerdictRecord,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_dt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_dt_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// Run record row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbTestRun {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub repository_id: String,
    pub test_name: String,
    pub spec_file: String,
    /// "passed" | "failed" | "skipped"
    pub status: String,
    pub commit_sha: String,
    pub branch: String,
    pub run_id: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
}

impl From<&TestRunRecord> for DbTestRun {
    fn from(run: &TestRunRecord) -> Self {
        Self {
            id: None,
            repository_id: run.repository_id.0.clone(),
            test_name: run.test_name.clone(),
            spec_file: run.spec_file.clone(),
            status: run.status.as_str().to_string(),
            commit_sha: run.commit_sha.clone(),
            branch: run.branch.clone(),
            run_id: run.run_id.clone(),
            duration_ms: run.duration_ms,
            error_message: run.error_message.clone(),
            stack_trace: run.stack_trace.clone(),
            created_at: run.created_at,
        }
    }
}

impl TryFrom<DbTestRun> for TestRunRecord {
    type Error = StorageError;

    fn try_from(row: DbTestRun) -> Result<Self, Self::Error> {
        let status: RunStatus = row.status.parse().map_err(|message| StorageError::Corrupt {
            table: "test_runs".to_string(),
            message,
        })?;
        Ok(TestRunRecord {
            repository_id: RepositoryId(row.repository_id),
            test_name: row.test_name,
            spec_file: row.spec_file,
            status,
            commit_sha: row.commit_sha,
            branch: row.branch,
            run_id: row.run_id,
            duration_ms: row.duration_ms,
            error_message: row.error_message,
            stack_trace: row.stack_trace,
            created_at: row.created_at,
        })
    }
}

/// Repository row (record key = repository id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbRepository {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub repository_id: String,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub test_count: u32,
    #[serde(default)]
    pub flake_threshold: Option<f64>,
    #[serde(default)]
    pub failure_threshold: Option<f64>,
    #[serde(default)]
    pub default_jira_board: Option<String>,
    pub time_period: String,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(with = "surreal_dt")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_dt")]
    pub updated_at: DateTime<Utc>,
}

impl From<&RepositoryRecord> for DbRepository {
    fn from(repo: &RepositoryRecord) -> Self {
        Self {
            id: None,
            repository_id: repo.id.0.clone(),
            owner: repo.owner.clone(),
            name: repo.name.clone(),
            description: repo.description.clone(),
            test_count: repo.test_count,
            flake_threshold: repo.flake_threshold,
            failure_threshold: repo.failure_threshold,
            default_jira_board: repo.default_jira_board.clone(),
            time_period: repo.time_period.clone(),
            classifier: repo.classifier,
            created_at: repo.created_at,
            updated_at: repo.updated_at,
        }
    }
}

impl From<DbRepository> for RepositoryRecord {
    fn from(row: DbRepository) -> Self {
        RepositoryRecord {
            id: RepositoryId(row.repository_id),
            owner: row.owner,
            name: row.name,
            description: row.description,
            test_count: row.test_count,
            flake_threshold: row.flake_threshold,
            failure_threshold: row.failure_threshold,
            default_jira_board: row.default_jira_board,
            time_period: row.time_period,
            classifier: row.classifier,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Test row (record key = test id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbTest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub test_id: String,
    pub repository_id: String,
    pub name: String,
    pub file: String,
    pub flake_rate: f64,
    pub failure_rate: f64,
    pub excluded: bool,
    pub manual_override: bool,
    #[serde(default)]
    pub jira_ticket: Option<JiraTicketRef>,
    #[serde(default)]
    pub runs_considered: u32,
    #[serde(default, with = "surreal_dt_opt")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_dt_opt")]
    pub ticket_checked_at: Option<DateTime<Utc>>,
    #[serde(with = "surreal_dt")]
    pub updated_at: DateTime<Utc>,
}

impl From<&TestRecord> for DbTest {
    fn from(test: &TestRecord) -> Self {
        Self {
            id: None,
            test_id: test.id.0.clone(),
            repository_id: test.repository_id.0.clone(),
            name: test.name.clone(),
            file: test.file.clone(),
            flake_rate: test.flake_rate,
            failure_rate: test.failure_rate,
            excluded: test.excluded,
            manual_override: test.manual_override,
            jira_ticket: test.jira_ticket.clone(),
            runs_considered: test.runs_considered,
            last_run_at: test.last_run_at,
            ticket_checked_at: test.ticket_checked_at,
            updated_at: test.updated_at,
        }
    }
}

impl From<DbTest> for TestRecord {
    fn from(row: DbTest) -> Self {
        TestRecord {
            id: TestId(row.test_id),
            repository_id: RepositoryId(row.repository_id),
            name: row.name,
            file: row.file,
            flake_rate: row.flake_rate,
            failure_rate: row.failure_rate,
            excluded: row.excluded,
            manual_override: row.manual_override,
            jira_ticket: row.jira_ticket,
            runs_considered: row.runs_considered,
            last_run_at: row.last_run_at,
            ticket_checked_at: row.ticket_checked_at,
            updated_at: row.updated_at,
        }
    }
}

/// Verdict row (record key = test id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbVerdict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub test_id: String,
    pub repository_id: String,
    pub test_name: String,
    pub spec_file: String,
    pub flakiness_rate: f64,
    pub occurrences: u32,
    #[serde(default)]
    pub flaky_commits: Vec<String>,
    #[serde(default)]
    pub runs_considered: u32,
    #[serde(with = "surreal_dt")]
    pub evaluated_at: DateTime<Utc>,
}

impl From<&VerdictRecord> for DbVerdict {
    fn from(v: &VerdictRecord) -> Self {
        Self {
            id: None,
            test_id: v.test_id().0,
            repository_id: v.repository_id.0.clone(),
            test_name: v.test_name.clone(),
            spec_file: v.spec_file.clone(),
            flakiness_rate: v.flakiness_rate,
            occurrences: v.occurrences,
            flaky_commits: v.flaky_commits.clone(),
            runs_considered: v.runs_considered,
            evaluated_at: v.evaluated_at,
        }
    }
}

impl From<DbVerdict> for VerdictRecord {
    fn from(row: DbVerdict) -> Self {
        VerdictRecord {
            repository_id: RepositoryId(row.repository_id),
            test_name: row.test_name,
            spec_file: row.spec_file,
            flakiness_rate: row.flakiness_rate,
            occurrences: row.occurrences,
            flaky_commits: row.flaky_commits,
            runs_considered: row.runs_considered,
            evaluated_at: row.evaluated_at,
        }
    }
}

/// Settings row (`settings:global`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub settings: GlobalSettings,
    #[serde(with = "surreal_dt")]
    pub updated_at: DateTime<Utc>,
}
