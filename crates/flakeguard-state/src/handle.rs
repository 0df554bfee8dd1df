//! Store Handle - connection configuration and one-time initialization
//!
//! `StoreHandle` owns the connection settings and connects lazily on first
//! use. Concurrent first callers all wait on the same initialization, so the
//! database is connected and migrated exactly once per handle.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, instrument};

use crate::surreal_store::SurrealStore;
use crate::Result;

/// Configuration for SurrealDB Cloud connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "flakeguard")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new cloud configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: "flakeguard".to_string(),
            database: "main".to_string(),
            is_root: false,
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "flakeguard")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false") - set to "true" for root users
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace =
            std::env::var("SURREALDB_NAMESPACE").unwrap_or_else(|_| "flakeguard".to_string());
        let database = std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| "main".to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Where the store lives.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    /// Authenticated remote database
    Cloud(CloudConfig),
    /// Any SurrealDB URL (`ws://`, `surrealkv://`, `mem://`), no auth
    Url(String),
    /// Local SurrealKV directory
    Local(PathBuf),
    /// Process-local in-memory database
    Memory,
}

impl StoreConfig {
    /// Resolve from environment variables.
    ///
    /// If the SURREALDB_ENDPOINT family is set, connects to cloud.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to local persistence in `.flakeguard/db`.
    pub fn from_env() -> Self {
        if let Ok(config) = CloudConfig::from_env() {
            return StoreConfig::Cloud(config);
        }
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return StoreConfig::Url(url);
        }
        StoreConfig::Local(PathBuf::from(".flakeguard/db"))
    }

    /// Short human-readable description (no credentials).
    pub fn describe(&self) -> String {
        match self {
            StoreConfig::Cloud(c) => format!("cloud {} ({}/{})", c.endpoint, c.namespace, c.database),
            StoreConfig::Url(url) => url.clone(),
            StoreConfig::Local(path) => format!("surrealkv://{}", path.display()),
            StoreConfig::Memory => "mem://".to_string(),
        }
    }
}

/// Lazily-connected, shareable store handle.
///
/// Cloning is not needed: wrap the handle in an `Arc` and inject it.
pub struct StoreHandle {
    config: StoreConfig,
    store: OnceCell<Arc<SurrealStore>>,
}

impl StoreHandle {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether the connection has been established yet.
    pub fn is_connected(&self) -> bool {
        self.store.initialized()
    }

    /// Get the store, connecting on first call.
    ///
    /// A failed connection is not cached: the next caller retries.
    #[instrument(skip_all, fields(store = %self.config.describe()))]
    pub async fn get(&self) -> Result<Arc<SurrealStore>> {
        let store = self
            .store
            .get_or_try_init(|| async {
                info!("Connecting store");
                SurrealStore::connect(&self.config).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(store))
    }
}
