//! SurrealDB-backed implementation of every Flakeguard storage trait
//!
//! Uses the row types in `schema` for persistence, converting to/from
//! `storage_traits` types at the boundary. Mutable rows are keyed by their
//! derived id (`tests:<test id>`), so each write is a single UPSERT.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::handle::{CloudConfig, StoreConfig};
use crate::migrations;
use crate::schema::{DbRepository, DbSettings, DbTest, DbTestRun, DbVerdict};
use crate::storage_traits::*;

const DEFAULT_NAMESPACE: &str = "flakeguard";
const DEFAULT_DATABASE: &str = "main";

/// SurrealDB-backed store.
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `flakeguard/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect(&StoreConfig::Memory).await
    }

    /// Connect according to `config` and make sure the schema exists.
    pub async fn connect(config: &StoreConfig) -> crate::Result<Self> {
        let db = match config {
            StoreConfig::Cloud(cloud) => Self::open_cloud(cloud).await?,
            StoreConfig::Url(url) => Self::open_url(url).await?,
            StoreConfig::Local(path) => {
                std::fs::create_dir_all(path).map_err(|e| {
                    StateError::Connection(format!(
                        "Failed to create database directory {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::open_url(&format!("surrealkv://{}", path.display())).await?
            }
            StoreConfig::Memory => Self::open_url("mem://").await?,
        };

        migrations::init_schema(&db).await?;
        info!(store = %config.describe(), "SurrealStore connected");
        Ok(Self { db })
    }

    async fn open_url(url: &str) -> crate::Result<Surreal<Any>> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        Ok(db)
    }

    async fn open_cloud(config: &CloudConfig) -> crate::Result<Surreal<Any>> {
        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        Ok(db)
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_repository(&self, id: &str) -> StorageResult<Option<DbRepository>> {
        let id_owned = id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('repositories', $id)")
            .bind(("id", id_owned))
            .await?;
        let rows: Vec<DbRepository> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn write_repository(&self, row: DbRepository) -> StorageResult<()> {
        let id_owned = row.repository_id.clone();
        self.db
            .query("UPSERT type::thing('repositories', $id) CONTENT $row")
            .bind(("id", id_owned))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl RunRecordStore for SurrealStore {
    async fn append_runs(&self, runs: &[TestRunRecord]) -> StorageResult<usize> {
        if runs.is_empty() {
            return Ok(0);
        }
        let rows: Vec<DbTestRun> = runs.iter().map(DbTestRun::from).collect();
        debug!(count = rows.len(), "appending test runs");

        self.db
            .query("INSERT INTO test_runs $rows")
            .bind(("rows", rows))
            .await?
            .check()?;
        Ok(runs.len())
    }

    async fn list_runs(
        &self,
        repository_id: &RepositoryId,
        since: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<TestRunRecord>> {
        let rid = repository_id.0.clone();
        let rows: Vec<DbTestRun> = if let Some(since) = since {
            let since = surrealdb::sql::Datetime::from(since);
            let mut res = self
                .db
                .query("SELECT * FROM test_runs WHERE repository_id = $rid AND created_at >= $since")
                .bind(("rid", rid))
                .bind(("since", since))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM test_runs WHERE repository_id = $rid")
                .bind(("rid", rid))
                .await?;
            res.take(0)?
        };

        rows.into_iter().map(TestRunRecord::try_from).collect()
    }
}

#[async_trait]
impl RepositoryStore for SurrealStore {
    async fn create_repository(&self, repo: RepositoryRecord) -> StorageResult<RepositoryRecord> {
        if self.fetch_repository(repo.id.as_str()).await?.is_some() {
            return Err(StorageError::Conflict {
                message: format!("repository {} already exists", repo.full_name()),
            });
        }
        self.write_repository(DbRepository::from(&repo)).await?;
        debug!(repository = %repo.full_name(), "repository created");
        Ok(repo)
    }

    async fn get_repository(&self, id: &RepositoryId) -> StorageResult<RepositoryRecord> {
        self.fetch_repository(id.as_str())
            .await?
            .map(RepositoryRecord::from)
            .ok_or_else(|| StorageError::RepositoryNotFound { id: id.0.clone() })
    }

    async fn find_repository(
        &self,
        owner: Option<&str>,
        name: &str,
    ) -> StorageResult<Option<RepositoryRecord>> {
        let name = name.trim().to_ascii_lowercase();
        let rows: Vec<DbRepository> = if let Some(owner) = owner {
            let owner = owner.trim().to_ascii_lowercase();
            let mut res = self
                .db
                .query(
                    "SELECT * FROM repositories \
                     WHERE string::lowercase(name) = $name AND string::lowercase(owner) = $owner",
                )
                .bind(("name", name))
                .bind(("owner", owner))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM repositories WHERE string::lowercase(name) = $name")
                .bind(("name", name))
                .await?;
            res.take(0)?
        };

        let mut found: Vec<RepositoryRecord> = rows.into_iter().map(RepositoryRecord::from).collect();
        found.sort_by_key(|r| r.full_name());
        Ok(found.into_iter().next())
    }

    async fn list_repositories(&self) -> StorageResult<Vec<RepositoryRecord>> {
        let mut res = self.db.query("SELECT * FROM repositories").await?;
        let rows: Vec<DbRepository> = res.take(0)?;
        let mut all: Vec<RepositoryRecord> = rows.into_iter().map(RepositoryRecord::from).collect();
        all.sort_by_key(|r| r.full_name());
        Ok(all)
    }

    async fn update_repository(&self, repo: &RepositoryRecord) -> StorageResult<()> {
        if self.fetch_repository(repo.id.as_str()).await?.is_none() {
            return Err(StorageError::RepositoryNotFound {
                id: repo.id.0.clone(),
            });
        }
        self.write_repository(DbRepository::from(repo)).await
    }
}

#[async_trait]
impl TestStore for SurrealStore {
    async fn upsert_test(&self, test: &TestRecord) -> StorageResult<()> {
        let id_owned = test.id.0.clone();
        let row = DbTest::from(test);
        self.db
            .query("UPSERT type::thing('tests', $id) CONTENT $row")
            .bind(("id", id_owned))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }

    async fn get_test(&self, id: &TestId) -> StorageResult<TestRecord> {
        let id_owned = id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('tests', $id)")
            .bind(("id", id_owned))
            .await?;
        let rows: Vec<DbTest> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(TestRecord::from)
            .ok_or_else(|| StorageError::TestNotFound { id: id.0.clone() })
    }

    async fn list_tests(&self, repository_id: &RepositoryId) -> StorageResult<Vec<TestRecord>> {
        let rid = repository_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM tests WHERE repository_id = $rid")
            .bind(("rid", rid))
            .await?;
        let rows: Vec<DbTest> = res.take(0)?;
        let mut found: Vec<TestRecord> = rows.into_iter().map(TestRecord::from).collect();
        found.sort_by(|a, b| (&a.file, &a.name).cmp(&(&b.file, &b.name)));
        Ok(found)
    }
}

#[async_trait]
impl VerdictStore for SurrealStore {
    async fn upsert_verdict(&self, verdict: &VerdictRecord) -> StorageResult<()> {
        let row = DbVerdict::from(verdict);
        let id_owned = row.test_id.clone();
        self.db
            .query("UPSERT type::thing('flaky_verdicts', $id) CONTENT $row")
            .bind(("id", id_owned))
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }

    async fn remove_verdict(&self, test_id: &TestId) -> StorageResult<bool> {
        let id_owned = test_id.0.clone();
        let mut res = self
            .db
            .query("DELETE type::thing('flaky_verdicts', $id) RETURN BEFORE")
            .bind(("id", id_owned))
            .await?;
        let removed: Vec<DbVerdict> = res.take(0)?;
        Ok(!removed.is_empty())
    }

    async fn list_verdicts(
        &self,
        repository_id: &RepositoryId,
    ) -> StorageResult<Vec<VerdictRecord>> {
        let rid = repository_id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM flaky_verdicts WHERE repository_id = $rid")
            .bind(("rid", rid))
            .await?;
        let rows: Vec<DbVerdict> = res.take(0)?;
        let mut found: Vec<VerdictRecord> = rows.into_iter().map(VerdictRecord::from).collect();
        found.sort_by(|a, b| (&a.spec_file, &a.test_name).cmp(&(&b.spec_file, &b.test_name)));
        Ok(found)
    }
}

#[async_trait]
impl SettingsStore for SurrealStore {
    async fn load_settings(&self) -> StorageResult<GlobalSettings> {
        let mut res = self.db.query("SELECT * FROM settings:global").await?;
        let rows: Vec<DbSettings> = res.take(0)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.settings)
            .unwrap_or_default())
    }

    async fn save_settings(&self, settings: &GlobalSettings) -> StorageResult<()> {
        let row = DbSettings {
            id: None,
            settings: settings.clone(),
            updated_at: Utc::now(),
        };
        self.db
            .query("UPSERT settings:global CONTENT $row")
            .bind(("row", row))
            .await?
            .check()?;
        Ok(())
    }
}
