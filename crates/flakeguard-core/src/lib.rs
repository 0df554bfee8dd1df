//! Flakeguard Core Library
//!
//! Flaky-test classification, threshold reconciliation, size-tier
//! recommendations and guardrails, plus the [`FlakeService`] operations the
//! daemon exposes over HTTP.

pub mod classifier;
pub mod domain;
pub mod git;
pub mod guardrails;
pub mod metrics;
pub mod obs;
pub mod service;
pub mod telemetry;
pub mod thresholds;
pub mod tiers;
pub mod validation;

pub use classifier::{build_windows, Classification, FlakeClassifier, TestWindow};

pub use domain::{
    AnalysisSummary, CreateRepositoryRequest, CreateTicketRequest, CreatedTicket, ExcludedTest,
    ExcludedTestsResponse, ExclusionChange, ExclusionReason, FieldError, FlakeguardError,
    GuardrailViolation, IngestRecord, IngestRequest, IngestResponse, RecalculationSummary,
    RepositoryDashboard, Result, SpecPatternResponse, ThresholdUpdate, ThresholdUpdateResponse,
    TicketRefreshSummary, TicketResponse, ToggleRequest, ValidationError,
};

pub use git::{
    ChangeDetectionError, GitChangeDetector, NoChangeDetector, SpecChangeDetector,
    StaticChangeDetector,
};

pub use service::FlakeService;

pub use thresholds::{EffectiveThresholds, ThresholdSource};

pub use tiers::{SizeTier, TierRecommendation};

pub use flakeguard_state::{
    ClassifierSettings, GlobalSettings, Guardrails, JiraTicketRef, RepositoryId, RepositoryRecord,
    RunStatus, Store, TestId, TestRecord, TestRunRecord, VerdictRecord,
};
