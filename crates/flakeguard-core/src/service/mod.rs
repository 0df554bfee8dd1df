//! Service operations behind the HTTP API.
//!
//! [`FlakeService`] owns injected handles to the store, the ticket gateway
//! and the spec-change detector. Every operation is request-scoped; there is
//! no background work.
//!
//! Locking: writes that touch several tests of one repository (ingestion,
//! recalculation, ticket refresh, exclusion changes) hold the repository
//! lock, so guardrail counts are exact. Read-modify-write of a single test
//! additionally holds that test's lock. Locks are always taken repository
//! first.

mod exclusion;
mod ingest;
mod locks;
mod repositories;
mod tickets;

use std::sync::Arc;

use chrono::Duration;

use flakeguard_jira::TicketGateway;
use flakeguard_state::{RepositoryId, RepositoryRecord, Store, TestId, TestRecord};

use crate::domain::{FlakeguardError, Result, ValidationError};
use crate::git::SpecChangeDetector;
use crate::validation::split_repository;

use locks::KeyedLocks;

pub use tickets::{default_description, default_summary};

/// How long a "no ticket found" answer is trusted before the dashboard
/// searches again.
pub const DEFAULT_TICKET_TTL_MINUTES: i64 = 10;

/// Flakeguard operations over injected collaborators.
pub struct FlakeService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn TicketGateway>,
    detector: Arc<dyn SpecChangeDetector>,
    locks: KeyedLocks,
    ticket_ttl: Duration,
}

impl FlakeService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn TicketGateway>,
        detector: Arc<dyn SpecChangeDetector>,
    ) -> Self {
        Self {
            store,
            gateway,
            detector,
            locks: KeyedLocks::default(),
            ticket_ttl: Duration::minutes(DEFAULT_TICKET_TTL_MINUTES),
        }
    }

    /// Override the ticket-cache freshness window.
    pub fn with_ticket_ttl(mut self, ttl: Duration) -> Self {
        self.ticket_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Whether ticket creation and lookup are available.
    pub fn ticketing_enabled(&self) -> bool {
        self.gateway.is_enabled()
    }

    /// Resolve a repository reference: an id, `owner/name`, or a bare name.
    pub async fn resolve_repository(&self, reference: &str) -> Result<RepositoryRecord> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ValidationError::field("repo", "is required").into());
        }

        match self
            .store
            .get_repository(&RepositoryId(reference.to_string()))
            .await
        {
            Ok(repo) => return Ok(repo),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        let (owner, name) = split_repository(reference, None);
        self.store
            .find_repository(owner, name)
            .await?
            .ok_or_else(|| FlakeguardError::not_found("repository", reference))
    }

    /// Fetch a test, checking that it belongs to `repo` when given.
    async fn load_test(&self, test_id: &str, repo: Option<&RepositoryId>) -> Result<TestRecord> {
        let test_id = test_id.trim();
        if test_id.is_empty() {
            return Err(ValidationError::field("testId", "is required").into());
        }
        let test = self.store.get_test(&TestId(test_id.to_string())).await?;
        match repo {
            Some(repo) if *repo != test.repository_id => {
                Err(FlakeguardError::not_found("test", test_id))
            }
            _ => Ok(test),
        }
    }
}

fn repo_key(id: &RepositoryId) -> String {
    format!("repository:{id}")
}

fn test_key(id: &TestId) -> String {
    format!("test:{id}")
}
