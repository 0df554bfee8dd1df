//! Flakeguard-State: SurrealDB Backend for Flakeguard
//!
//! This crate provides the persistence layer for flaky-test tracking.
//! It handles all I/O with SurrealDB behind backend-agnostic async traits.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: immutable run records, atomic per-test writes, one settings row.
//!
//! ## Key Components
//!
//! - `StoreHandle`: lazily connects once and hands out the shared store
//! - `SurrealStore`: SurrealDB implementation of every storage trait
//! - `fakes::MemoryStore`: in-memory implementation for tests

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, StoreConfig, StoreHandle};
pub use storage_traits::{
    ClassifierSettings, GlobalSettings, Guardrails, JiraTicketRef, Recommendation,
    RepoSizeThresholds, RepositoryId, RepositoryRecord, RepositoryStore, RunRecordStore,
    RunStatus, SettingsStore, Store, StorageResult, TestId, TestRecord, TestRunRecord, TestStore,
    TierRecommendations, VerdictRecord, VerdictStore,
};
pub use surreal_store::SurrealStore;

/// Result type for flakeguard-state connection operations
pub type Result<T> = std::result::Result<T, StateError>;
