//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryStore` satisfies every storage trait contract without any
//! external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory store backed by `HashMap`s behind `std::sync::Mutex`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: Mutex<Vec<TestRunRecord>>,
    repositories: Mutex<HashMap<String, RepositoryRecord>>,
    tests: Mutex<HashMap<String, TestRecord>>,
    verdicts: Mutex<HashMap<String, VerdictRecord>>,
    settings: Mutex<Option<GlobalSettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of run records written so far.
    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl RunRecordStore for MemoryStore {
    async fn append_runs(&self, runs: &[TestRunRecord]) -> StorageResult<usize> {
        let mut store = self.runs.lock().unwrap();
        store.extend_from_slice(runs);
        Ok(runs.len())
    }

    async fn list_runs(
        &self,
        repository_id: &RepositoryId,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<TestRunRecord>> {
        let store = self.runs.lock().unwrap();
        Ok(store
            .iter()
            .filter(|r| &r.repository_id == repository_id)
            .filter(|r| since.map(|s| r.created_at >= s).unwrap_or(true))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RepositoryStore for MemoryStore {
    async fn create_repository(&self, repo: RepositoryRecord) -> StorageResult<RepositoryRecord> {
        let mut repos = self.repositories.lock().unwrap();
        if repos.contains_key(repo.id.as_str()) {
            return Err(StorageError::Conflict {
                message: format!("repository {} already exists", repo.full_name()),
            });
        }
        repos.insert(repo.id.0.clone(), repo.clone());
        Ok(repo)
    }

    async fn get_repository(&self, id: &RepositoryId) -> StorageResult<RepositoryRecord> {
        let repos = self.repositories.lock().unwrap();
        repos
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::RepositoryNotFound { id: id.0.clone() })
    }

    async fn find_repository(
        &self,
        owner: Option<&str>,
        name: &str,
    ) -> StorageResult<Option<RepositoryRecord>> {
        let repos = self.repositories.lock().unwrap();
        let mut matches: Vec<&RepositoryRecord> = repos
            .values()
            .filter(|r| r.name.eq_ignore_ascii_case(name))
            .filter(|r| owner.map(|o| r.owner.eq_ignore_ascii_case(o)).unwrap_or(true))
            .collect();
        matches.sort_by_key(|r| r.full_name());
        Ok(matches.first().map(|r| (*r).clone()))
    }

    async fn list_repositories(&self) -> StorageResult<Vec<RepositoryRecord>> {
        let repos = self.repositories.lock().unwrap();
        let mut all: Vec<RepositoryRecord> = repos.values().cloned().collect();
        all.sort_by_key(|r| r.full_name());
        Ok(all)
    }

    async fn update_repository(&self, repo: &RepositoryRecord) -> StorageResult<()> {
        let mut repos = self.repositories.lock().unwrap();
        let slot = repos
            .get_mut(repo.id.as_str())
            .ok_or_else(|| StorageError::RepositoryNotFound { id: repo.id.0.clone() })?;
        *slot = repo.clone();
        Ok(())
    }
}

#[async_trait]
impl TestStore for MemoryStore {
    async fn upsert_test(&self, test: &TestRecord) -> StorageResult<()> {
        let mut tests = self.tests.lock().unwrap();
        tests.insert(test.id.0.clone(), test.clone());
        Ok(())
    }

    async fn get_test(&self, id: &TestId) -> StorageResult<TestRecord> {
        let tests = self.tests.lock().unwrap();
        tests
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::TestNotFound { id: id.0.clone() })
    }

    async fn list_tests(&self, repository_id: &RepositoryId) -> StorageResult<Vec<TestRecord>> {
        let tests = self.tests.lock().unwrap();
        let mut found: Vec<TestRecord> = tests
            .values()
            .filter(|t| &t.repository_id == repository_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.file, &a.name).cmp(&(&b.file, &b.name)));
        Ok(found)
    }
}

#[async_trait]
impl VerdictStore for MemoryStore {
    async fn upsert_verdict(&self, verdict: &VerdictRecord) -> StorageResult<()> {
        let mut verdicts = self.verdicts.lock().unwrap();
        verdicts.insert(verdict.test_id().0, verdict.clone());
        Ok(())
    }

    async fn remove_verdict(&self, test_id: &TestId) -> StorageResult<bool> {
        let mut verdicts = self.verdicts.lock().unwrap();
        Ok(verdicts.remove(test_id.as_str()).is_some())
    }

    async fn list_verdicts(
        &self,
        repository_id: &RepositoryId,
    ) -> StorageResult<Vec<VerdictRecord>> {
        let verdicts = self.verdicts.lock().unwrap();
        let mut found: Vec<VerdictRecord> = verdicts
            .values()
            .filter(|v| &v.repository_id == repository_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| (&a.spec_file, &a.test_name).cmp(&(&b.spec_file, &b.test_name)));
        Ok(found)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_settings(&self) -> StorageResult<GlobalSettings> {
        let settings = self.settings.lock().unwrap();
        Ok(settings.clone().unwrap_or_default())
    }

    async fn save_settings(&self, settings: &GlobalSettings) -> StorageResult<()> {
        let mut slot = self.settings.lock().unwrap();
        *slot = Some(settings.clone());
        Ok(())
    }
}
