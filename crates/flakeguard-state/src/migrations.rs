//! SurrealDB schema initialization
//!
//! Sets up every Flakeguard table with its indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Flakeguard tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Flakeguard SurrealDB schema");

    init_test_runs_table(db).await?;
    init_repositories_table(db).await?;
    init_tests_table(db).await?;
    init_verdicts_table(db).await?;
    init_settings_table(db).await?;

    info!("Flakeguard schema initialization complete");
    Ok(())
}

/// Initialize `test_runs` table
///
/// Schema:
/// ```text
/// TABLE test_runs {
///   repository_id:  STRING (indexed)
///   test_name:      STRING
///   spec_file:      STRING
///   status:         STRING (enum: passed | failed | skipped)
///   commit_sha:     STRING (indexed)
///   branch:         STRING
///   run_id:         STRING
///   duration_ms:    INT?
///   error_message:  STRING?
///   stack_trace:    STRING?
///   created_at:     DATETIME (indexed)
/// }
/// ```
///
/// Rows are append-only: updates and deletes are not permitted.
async fn init_test_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing test_runs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS test_runs SCHEMALESS
            PERMISSIONS
                FOR select, create FULL
                FOR update, delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_runs_repository_created
            ON TABLE test_runs COLUMNS repository_id, created_at;
        DEFINE INDEX IF NOT EXISTS idx_runs_test
            ON TABLE test_runs COLUMNS repository_id, spec_file, test_name;
        DEFINE INDEX IF NOT EXISTS idx_runs_commit
            ON TABLE test_runs COLUMNS commit_sha;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ test_runs table initialized");
    Ok(())
}

/// Initialize `repositories` table (record key = repository id)
async fn init_repositories_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing repositories table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS repositories SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_repositories_id
            ON TABLE repositories COLUMNS repository_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_repositories_name
            ON TABLE repositories COLUMNS owner, name;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ repositories table initialized");
    Ok(())
}

/// Initialize `tests` table (record key = test id)
///
/// A test row is always written whole, so `excluded` and `manual_override`
/// change together.
async fn init_tests_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing tests table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS tests SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_tests_id
            ON TABLE tests COLUMNS test_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_tests_repository
            ON TABLE tests COLUMNS repository_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ tests table initialized");
    Ok(())
}

/// Initialize `flaky_verdicts` table (record key = test id)
async fn init_verdicts_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing flaky_verdicts table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS flaky_verdicts SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_verdicts_repository
            ON TABLE flaky_verdicts COLUMNS repository_id;
    "#;

    db.query(sql).await?.check()?;
    info!("✓ flaky_verdicts table initialized");
    Ok(())
}

/// Initialize `settings` table (single `settings:global` row)
async fn init_settings_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing settings table");

    db.query("DEFINE TABLE IF NOT EXISTS settings SCHEMALESS;")
        .await?
        .check()?;
    info!("✓ settings table initialized");
    Ok(())
}
