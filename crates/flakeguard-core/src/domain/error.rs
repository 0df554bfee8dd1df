//! Domain-level error taxonomy for Flakeguard.

use flakeguard_jira::JiraError;
use flakeguard_state::StorageError;
use serde::Serialize;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Input rejected, reported per field.
#[derive(Debug, Clone, PartialEq, Default, thiserror::Error)]
#[error("validation failed: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(field, message)],
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> std::result::Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// An exclusion change that would breach a guardrail.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "camelCase")]
pub enum GuardrailViolation {
    #[error("excluding this test would exclude {resulting} tests (limit {limit})")]
    MaxExcludedTests { limit: u32, resulting: u32 },

    #[error("excluding this test would exclude {resulting:.1}% of tests (limit {limit:.1}%)")]
    MaxExcludedPercentage { limit: f64, resulting: f64 },

    #[error("test {test_id} needs a Jira ticket before it can be excluded manually")]
    #[serde(rename_all = "camelCase")]
    TicketRequired { test_id: String },
}

/// Flakeguard domain errors.
#[derive(Debug, thiserror::Error)]
pub enum FlakeguardError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("guardrail violation: {0}")]
    Guardrail(#[from] GuardrailViolation),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl FlakeguardError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        FlakeguardError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<StorageError> for FlakeguardError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RepositoryNotFound { id } => FlakeguardError::not_found("repository", id),
            StorageError::TestNotFound { id } => FlakeguardError::not_found("test", id),
            StorageError::Conflict { message } => FlakeguardError::Conflict(message),
            other => FlakeguardError::Storage(other),
        }
    }
}

impl From<JiraError> for FlakeguardError {
    fn from(err: JiraError) -> Self {
        FlakeguardError::Upstream(format!("jira: {err}"))
    }
}

/// Result type for Flakeguard domain operations.
pub type Result<T> = std::result::Result<T, FlakeguardError>;
