//! Input validation for service operations.
//!
//! Every check reports per field; a request with several bad fields gets all
//! of them back at once.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde_json::Value;

use flakeguard_state::{ClassifierSettings, GlobalSettings, RepositoryId, RunStatus, TestRunRecord};

use crate::domain::{CreateTicketRequest, FieldError, IngestRequest, ValidationError};

/// Parse a percentage threshold given as a JSON number or numeric string.
///
/// Must be finite and within [0, 100].
pub fn parse_threshold(field: &str, raw: &Value) -> Result<f64, FieldError> {
    let value = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| FieldError::new(field, "must be a number"))?;

    check_percentage(field, value)
}

/// Parse an optional threshold query parameter.
pub fn parse_threshold_param(field: &str, raw: Option<&str>) -> Result<Option<f64>, FieldError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => {
            let value = s
                .parse::<f64>()
                .map_err(|_| FieldError::new(field, "must be a number"))?;
            check_percentage(field, value).map(Some)
        }
    }
}

fn check_percentage(field: &str, value: f64) -> Result<f64, FieldError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(FieldError::new(field, "must be between 0 and 100"));
    }
    Ok(value)
}

fn period_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(\d{1,4})\s*([hdw])$").ok())
        .as_ref()
}

/// Parse an analysis-window tag: `<n>h`, `<n>d`, `<n>w`, or `all`.
///
/// `all` means unbounded and yields `None`.
pub fn parse_time_period(tag: &str) -> Result<Option<Duration>, FieldError> {
    let tag = tag.trim().to_ascii_lowercase();
    if tag == "all" {
        return Ok(None);
    }
    let invalid = || FieldError::new("timePeriod", "must look like 24h, 14d, 2w or all");
    let caps = period_pattern()
        .and_then(|re| re.captures(&tag))
        .ok_or_else(invalid)?;
    let n: i64 = caps[1].parse().map_err(|_| invalid())?;
    if n == 0 {
        return Err(invalid());
    }
    let duration = match &caps[2] {
        "h" => Duration::hours(n),
        "d" => Duration::days(n),
        _ => Duration::weeks(n),
    };
    Ok(Some(duration))
}

/// Lower bound of the analysis window ending at `now`.
pub fn window_start(tag: &str, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, FieldError> {
    Ok(parse_time_period(tag)?.map(|d| now - d))
}

/// Split a `repository` reference into (owner, name). A bare name has no
/// owner. An explicit `owner` wins over one embedded in the reference.
pub fn split_repository<'a>(reference: &'a str, owner: Option<&'a str>) -> (Option<&'a str>, &'a str) {
    let reference = reference.trim();
    let owner = owner.map(str::trim).filter(|o| !o.is_empty());
    match reference.split_once('/') {
        Some((embedded, name)) => (owner.or(Some(embedded)), name),
        None => (owner, reference),
    }
}

/// Checked ingestion batch.
#[derive(Debug, Clone)]
pub struct ValidatedIngest {
    pub owner: Option<String>,
    pub name: String,
    /// Runs with a placeholder repository id; the caller assigns the real one.
    pub runs: Vec<TestRunRecord>,
}

/// Validate an ingestion batch and build run records.
///
/// Per-record commit, branch and run id fall back to the batch values. A
/// record without a timestamp is stamped `now`.
pub fn validate_ingest(req: &IngestRequest, now: DateTime<Utc>) -> Result<ValidatedIngest, ValidationError> {
    let mut errors = ValidationError::default();
    let (owner, name) = split_repository(&req.repository, req.owner.as_deref());
    if name.is_empty() {
        errors.push("repository", "is required");
    }
    if req.records.is_empty() {
        errors.push("records", "must contain at least one test result");
    }

    let placeholder = RepositoryId(String::new());
    let mut runs = Vec::with_capacity(req.records.len());
    for (i, record) in req.records.iter().enumerate() {
        let field = |f: &str| format!("records[{i}].{f}");

        if record.test_name.trim().is_empty() {
            errors.push(field("testName"), "is required");
        }
        if record.spec_file.trim().is_empty() {
            errors.push(field("specFile"), "is required");
        }
        let status = match record.status.parse::<RunStatus>() {
            Ok(s) => Some(s),
            Err(_) => {
                errors.push(field("status"), "must be passed, failed or skipped");
                None
            }
        };
        let commit_sha = record
            .commit_sha
            .as_deref()
            .or(req.commit_sha.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if commit_sha.is_none() {
            errors.push(field("commitSha"), "is required (per record or per batch)");
        }

        if let (Some(status), Some(commit_sha)) = (status, commit_sha) {
            runs.push(TestRunRecord {
                repository_id: placeholder.clone(),
                test_name: record.test_name.trim().to_string(),
                spec_file: record.spec_file.trim().to_string(),
                status,
                commit_sha: commit_sha.to_string(),
                branch: record
                    .branch
                    .clone()
                    .or_else(|| req.branch.clone())
                    .unwrap_or_default(),
                run_id: record
                    .run_id
                    .clone()
                    .or_else(|| req.run_id.clone())
                    .unwrap_or_default(),
                duration_ms: record.duration_ms,
                error_message: record.error_message.clone(),
                stack_trace: record.stack_trace.clone(),
                created_at: record.timestamp.unwrap_or(now),
            });
        }
    }

    errors.into_result()?;
    Ok(ValidatedIngest {
        owner: owner.map(str::to_string),
        name: name.to_string(),
        runs,
    })
}

/// Required ticket fields.
pub fn validate_ticket_request(req: &CreateTicketRequest) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    if req.test_id.trim().is_empty() {
        errors.push("testId", "is required");
    }
    if req.repository.trim().is_empty() {
        errors.push("repository", "is required");
    }
    if let Some(summary) = &req.summary {
        if summary.trim().is_empty() {
            errors.push("summary", "must not be blank");
        } else if summary.chars().count() > 255 {
            errors.push("summary", "must be at most 255 characters");
        }
    }
    errors.into_result()
}

/// Classifier tuning must be usable.
pub fn validate_classifier(settings: &ClassifierSettings, errors: &mut ValidationError) {
    if settings.minimum_runs == 0 {
        errors.push("classifier.minimumRuns", "must be at least 1");
    }
    if settings.flakiness_threshold == 0 {
        errors.push("classifier.flakinessThreshold", "must be at least 1");
    }
    if settings.max_runs_considered < settings.minimum_runs {
        errors.push(
            "classifier.maxRunsConsidered",
            "must be at least minimumRuns",
        );
    }
}

/// Global settings must be internally consistent.
pub fn validate_settings(settings: &GlobalSettings) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    let tiers = [
        ("flakeRecommendations", &settings.flake_recommendations),
        ("failureRecommendations", &settings.failure_recommendations),
    ];
    for (group, recs) in tiers {
        for (tier, rec) in [("small", &recs.small), ("medium", &recs.medium), ("large", &recs.large)] {
            let field = format!("{group}.{tier}.threshold");
            if let Err(e) = check_percentage(&field, rec.threshold) {
                errors.errors.push(e);
            }
        }
    }

    let bounds = &settings.repo_size_thresholds;
    if bounds.small >= bounds.medium {
        errors.push("repoSizeThresholds.medium", "must be greater than small");
    }

    if let Err(e) = check_percentage(
        "guardrails.maxExcludedTestsPercentage",
        settings.guardrails.max_excluded_tests_percentage,
    ) {
        errors.errors.push(e);
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IngestRecord;
    use serde_json::json;

    #[test]
    fn thresholds_accept_numbers_and_numeric_strings() {
        assert_eq!(parse_threshold("f", &json!(12.5)).unwrap(), 12.5);
        assert_eq!(parse_threshold("f", &json!("7")).unwrap(), 7.0);
        assert_eq!(parse_threshold("f", &json!(0)).unwrap(), 0.0);
        assert_eq!(parse_threshold("f", &json!(100)).unwrap(), 100.0);
    }

    #[test]
    fn thresholds_reject_out_of_range_and_garbage() {
        assert_eq!(
            parse_threshold("flakeThreshold", &json!(100.5)).unwrap_err().message,
            "must be between 0 and 100"
        );
        assert!(parse_threshold("f", &json!(-1)).is_err());
        assert_eq!(
            parse_threshold("f", &json!("ten")).unwrap_err().message,
            "must be a number"
        );
        assert!(parse_threshold("f", &json!(true)).is_err());
        assert!(parse_threshold_param("f", Some("NaN")).is_err());
        assert_eq!(parse_threshold_param("f", Some("")).unwrap(), None);
        assert_eq!(parse_threshold_param("f", Some("3")).unwrap(), Some(3.0));
    }

    #[test]
    fn time_periods() {
        assert_eq!(parse_time_period("14d").unwrap(), Some(Duration::days(14)));
        assert_eq!(parse_time_period("2w").unwrap(), Some(Duration::weeks(2)));
        assert_eq!(parse_time_period(" 24H ").unwrap(), Some(Duration::hours(24)));
        assert_eq!(parse_time_period("all").unwrap(), None);
        assert!(parse_time_period("0d").is_err());
        assert!(parse_time_period("fortnight").is_err());
        assert!(parse_time_period("5y").is_err());
    }

    #[test]
    fn repository_references() {
        assert_eq!(split_repository("acme/web", None), (Some("acme"), "web"));
        assert_eq!(split_repository("web", Some("acme")), (Some("acme"), "web"));
        assert_eq!(split_repository("web", None), (None, "web"));
        assert_eq!(split_repository("other/web", Some("acme")), (Some("acme"), "web"));
    }

    fn record(name: &str, status: &str) -> IngestRecord {
        IngestRecord {
            test_name: name.to_string(),
            spec_file: "a.cy.ts".to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn ingest_falls_back_to_batch_fields() {
        let req = IngestRequest {
            repository: "acme/web".into(),
            commit_sha: Some("abc1234".into()),
            branch: Some("main".into()),
            run_id: Some("42".into()),
            records: vec![record("works", "pass")],
            ..Default::default()
        };
        let now = Utc::now();
        let ok = validate_ingest(&req, now).unwrap();
        assert_eq!(ok.owner.as_deref(), Some("acme"));
        assert_eq!(ok.runs[0].commit_sha, "abc1234");
        assert_eq!(ok.runs[0].run_id, "42");
        assert_eq!(ok.runs[0].status, RunStatus::Passed);
        assert_eq!(ok.runs[0].created_at, now);
    }

    #[test]
    fn ingest_reports_every_bad_field() {
        let req = IngestRequest {
            repository: String::new(),
            records: vec![record("", "exploded")],
            ..Default::default()
        };
        let err = validate_ingest(&req, Utc::now()).unwrap_err();
        let fields: Vec<&str> = err.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "repository",
                "records[0].testName",
                "records[0].status",
                "records[0].commitSha"
            ]
        );
    }

    #[test]
    fn ticket_request_requires_ids() {
        let err = validate_ticket_request(&CreateTicketRequest::default()).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        let ok = CreateTicketRequest {
            test_id: "t".into(),
            repository: "acme/web".into(),
            ..Default::default()
        };
        assert!(validate_ticket_request(&ok).is_ok());
    }

    #[test]
    fn settings_must_be_consistent() {
        assert!(validate_settings(&GlobalSettings::default()).is_ok());
        let mut bad = GlobalSettings::default();
        bad.repo_size_thresholds.small = 600;
        bad.flake_recommendations.large.threshold = 120.0;
        let err = validate_settings(&bad).unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }
}
