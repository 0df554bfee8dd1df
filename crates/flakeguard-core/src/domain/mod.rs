//! Domain models for Flakeguard.
//!
//! Persistent entities (`RepositoryRecord`, `TestRecord`, `TestRunRecord`,
//! `VerdictRecord`, `GlobalSettings`) live in `flakeguard-state` and are
//! re-exported here; this module adds the error taxonomy and the request and
//! response shapes of the service operations.

pub mod error;
pub mod requests;

pub use error::{FieldError, FlakeguardError, GuardrailViolation, Result, ValidationError};
pub use requests::*;

pub use flakeguard_state::{
    ClassifierSettings, GlobalSettings, Guardrails, JiraTicketRef, Recommendation,
    RepoSizeThresholds, RepositoryId, RepositoryRecord, RunStatus, TestId, TestRecord,
    TestRunRecord, TierRecommendations, VerdictRecord,
};
