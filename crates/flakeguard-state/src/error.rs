//! Error types for flakeguard-state

use thiserror::Error;

/// Errors raised while connecting to or initializing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage traits
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// No repository with this id
    #[error("repository not found: {id}")]
    RepositoryNotFound { id: String },

    /// No test with this id
    #[error("test not found: {id}")]
    TestNotFound { id: String },

    /// A record with the same key already exists
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Stored value could not be decoded
    #[error("corrupt record in {table}: {message}")]
    Corrupt { table: String, message: String },

    /// Backend failure (connection, query, transaction)
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Whether the error means the addressed record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RepositoryNotFound { .. } | StorageError::TestNotFound { .. }
        )
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
