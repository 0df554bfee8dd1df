//! Trait contract tests for the Flakeguard stores.
//!
//! Every contract runs against both the in-memory fake and the SurrealDB
//! implementation (in-memory engine). Any conforming backend must pass these.

use chrono::{Duration, Utc};
use flakeguard_state::fakes::MemoryStore;
use flakeguard_state::storage_traits::*;
use flakeguard_state::{StorageError, SurrealStore};

fn run(repo: &RepositoryId, test: &str, status: RunStatus, minutes_ago: i64) -> TestRunRecord {
    TestRunRecord {
        repository_id: repo.clone(),
        test_name: test.to_string(),
        spec_file: "cypress/e2e/login.cy.ts".to_string(),
        status,
        commit_sha: "abc1234".to_string(),
        branch: "main".to_string(),
        run_id: format!("run-{minutes_ago}"),
        duration_ms: Some(1200),
        error_message: None,
        stack_trace: None,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}

// ===========================================================================
// Contracts (generic over the backend)
// ===========================================================================

async fn runs_are_scoped_and_windowed<S: Store>(store: &S) {
    let repo = RepositoryId::derive("acme", "web");
    let other = RepositoryId::derive("acme", "api");

    let written = store
        .append_runs(&[
            run(&repo, "logs in", RunStatus::Passed, 10),
            run(&repo, "logs in", RunStatus::Failed, 60 * 24 * 30),
            run(&other, "logs in", RunStatus::Passed, 5),
        ])
        .await
        .unwrap();
    assert_eq!(written, 3);
    assert_eq!(store.append_runs(&[]).await.unwrap(), 0);

    let all = store.list_runs(&repo, None).await.unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|r| r.repository_id == repo));

    let recent = store
        .list_runs(&repo, Some(Utc::now() - Duration::days(7)))
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].status, RunStatus::Passed);
}

async fn repository_lifecycle<S: Store>(store: &S) {
    let repo = RepositoryRecord::new("Acme", "Web");
    let created = store.create_repository(repo.clone()).await.unwrap();
    assert_eq!(created.id, repo.id);

    let dup = store.create_repository(repo.clone()).await.unwrap_err();
    assert!(matches!(dup, StorageError::Conflict { .. }));

    let found = store.find_repository(Some("acme"), "web").await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(repo.id.clone()));
    let by_name = store.find_repository(None, "WEB").await.unwrap();
    assert!(by_name.is_some());
    assert!(store.find_repository(None, "nope").await.unwrap().is_none());

    let mut updated = store.get_repository(&repo.id).await.unwrap();
    updated.flake_threshold = Some(12.5);
    updated.test_count = 42;
    store.update_repository(&updated).await.unwrap();
    let fetched = store.get_repository(&repo.id).await.unwrap();
    assert_eq!(fetched.flake_threshold, Some(12.5));
    assert_eq!(fetched.test_count, 42);

    let ghost = RepositoryRecord::new("acme", "ghost");
    let err = store.update_repository(&ghost).await.unwrap_err();
    assert!(err.is_not_found());
    let err = store.get_repository(&ghost.id).await.unwrap_err();
    assert!(matches!(err, StorageError::RepositoryNotFound { .. }));

    store
        .create_repository(RepositoryRecord::new("acme", "api"))
        .await
        .unwrap();
    let names: Vec<String> = store
        .list_repositories()
        .await
        .unwrap()
        .iter()
        .map(|r| r.full_name())
        .collect();
    assert_eq!(names, vec!["Acme/Web".to_string(), "acme/api".to_string()]);
}

async fn tests_upsert_in_place<S: Store>(store: &S) {
    let repo = RepositoryId::derive("acme", "web");
    let mut b = TestRecord::new(repo.clone(), "b.cy.ts", "second");
    let a = TestRecord::new(repo.clone(), "a.cy.ts", "first");
    store.upsert_test(&b).await.unwrap();
    store.upsert_test(&a).await.unwrap();

    b.excluded = true;
    b.manual_override = true;
    b.jira_ticket = Some(JiraTicketRef {
        key: "QA-1".into(),
        url: "https://jira.example/browse/QA-1".into(),
    });
    store.upsert_test(&b).await.unwrap();

    let listed = store.list_tests(&repo).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "first");
    assert!(listed[1].excluded && listed[1].manual_override);
    assert_eq!(listed[1].jira_ticket.as_ref().map(|t| t.key.as_str()), Some("QA-1"));

    let missing = TestId::derive(&repo, "c.cy.ts", "none");
    let err = store.get_test(&missing).await.unwrap_err();
    assert!(matches!(err, StorageError::TestNotFound { .. }));
}

async fn verdicts_supersede<S: Store>(store: &S) {
    let repo = RepositoryId::derive("acme", "web");
    let mut verdict = VerdictRecord {
        repository_id: repo.clone(),
        test_name: "logs in".into(),
        spec_file: "login.cy.ts".into(),
        flakiness_rate: 0.25,
        occurrences: 1,
        flaky_commits: vec!["abc1234".into()],
        runs_considered: 8,
        evaluated_at: Utc::now(),
    };
    store.upsert_verdict(&verdict).await.unwrap();
    verdict.occurrences = 2;
    verdict.flakiness_rate = 0.5;
    store.upsert_verdict(&verdict).await.unwrap();

    let listed = store.list_verdicts(&repo).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].occurrences, 2);

    assert!(store.remove_verdict(&verdict.test_id()).await.unwrap());
    assert!(!store.remove_verdict(&verdict.test_id()).await.unwrap());
    assert!(store.list_verdicts(&repo).await.unwrap().is_empty());
}

async fn settings_default_then_saved<S: Store>(store: &S) {
    assert_eq!(store.load_settings().await.unwrap(), GlobalSettings::default());

    let mut settings = GlobalSettings::default();
    settings.guardrails.max_excluded_tests = 3;
    settings.repo_size_thresholds.small = 50;
    store.save_settings(&settings).await.unwrap();
    assert_eq!(store.load_settings().await.unwrap(), settings);
}

// ===========================================================================
// MemoryStore
// ===========================================================================

#[tokio::test]
async fn memory_runs_are_scoped_and_windowed() {
    runs_are_scoped_and_windowed(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_repository_lifecycle() {
    repository_lifecycle(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_tests_upsert_in_place() {
    tests_upsert_in_place(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_verdicts_supersede() {
    verdicts_supersede(&MemoryStore::new()).await;
}

#[tokio::test]
async fn memory_settings_default_then_saved() {
    settings_default_then_saved(&MemoryStore::new()).await;
}

// ===========================================================================
// SurrealStore (mem://)
// ===========================================================================

#[tokio::test]
async fn surreal_runs_are_scoped_and_windowed() {
    let store = SurrealStore::in_memory().await.unwrap();
    runs_are_scoped_and_windowed(&store).await;
}

#[tokio::test]
async fn surreal_repository_lifecycle() {
    let store = SurrealStore::in_memory().await.unwrap();
    repository_lifecycle(&store).await;
}

#[tokio::test]
async fn surreal_tests_upsert_in_place() {
    let store = SurrealStore::in_memory().await.unwrap();
    tests_upsert_in_place(&store).await;
}

#[tokio::test]
async fn surreal_verdicts_supersede() {
    let store = SurrealStore::in_memory().await.unwrap();
    verdicts_supersede(&store).await;
}

#[tokio::test]
async fn surreal_settings_default_then_saved() {
    let store = SurrealStore::in_memory().await.unwrap();
    settings_default_then_saved(&store).await;
}
