use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use flakeguard_core::{
    CreateRepositoryRequest, CreateTicketRequest, FlakeService, FlakeguardError, IngestRequest,
    NoChangeDetector, RepositoryId, SizeTier, TestId, ThresholdSource,
};
use flakeguard_jira::fakes::MemoryTicketGateway;
use flakeguard_jira::{DisabledGateway, JiraError, TicketGateway};
use flakeguard_state::fakes::MemoryStore;
use flakeguard_state::TestStore;

const CHECKOUT: &str = "cypress/e2e/checkout.cy.ts";

struct Harness {
    svc: FlakeService,
    store: Arc<MemoryStore>,
    gateway: Arc<MemoryTicketGateway>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MemoryTicketGateway::new());
    let svc = FlakeService::new(store.clone(), gateway.clone(), Arc::new(NoChangeDetector));
    Harness {
        svc,
        store,
        gateway,
    }
}

fn harness_with_gateway(gateway: impl TicketGateway + 'static) -> (FlakeService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let svc = FlakeService::new(store.clone(), Arc::new(gateway), Arc::new(NoChangeDetector));
    (svc, store)
}

fn repository(value: Value) -> CreateRepositoryRequest {
    serde_json::from_value(value).unwrap()
}

fn ticket_request(value: Value) -> CreateTicketRequest {
    serde_json::from_value(value).unwrap()
}

fn record(name: &str, status: &str, sha: &str, minutes_ago: i64) -> Value {
    json!({
        "testName": name,
        "specFile": CHECKOUT,
        "status": status,
        "commitSha": sha,
        "timestamp": (Utc::now() - Duration::minutes(minutes_ago)).to_rfc3339(),
    })
}

/// One flaky test (`pays`) and one healthy test (`lists cart`).
async fn ingest_suite(svc: &FlakeService, repository: &str) {
    let mut records = vec![
        record("pays", "passed", "c1", 100),
        record("pays", "failed", "c1", 90),
        record("pays", "passed", "c2", 80),
        record("pays", "passed", "c2", 70),
        record("pays", "passed", "c3", 60),
    ];
    records.push(record("lists cart", "passed", "c3", 60));
    let req: IngestRequest =
        serde_json::from_value(json!({ "repository": repository, "records": records })).unwrap();
    svc.ingest(&req).await.unwrap();
}

fn pays_id(owner: &str, name: &str) -> TestId {
    TestId::derive(&RepositoryId::derive(owner, name), CHECKOUT, "pays")
}

async fn onboard(svc: &FlakeService, board: Option<&str>) {
    svc.create_repository(&repository(json!({
        "owner": "acme",
        "name": "web",
        "defaultJiraBoard": board,
    })))
    .await
    .unwrap();
}

// ---- repositories ----

#[tokio::test]
async fn onboarding_and_resolution() {
    let h = harness();
    let repo = h
        .svc
        .create_repository(&repository(json!({
            "owner": "acme",
            "name": "web",
            "description": "storefront",
            "testCount": 250,
            "flakeThreshold": "12.5",
            "timePeriod": "2W",
        })))
        .await
        .unwrap();
    assert_eq!(repo.flake_threshold, Some(12.5));
    assert_eq!(repo.failure_threshold, None);
    assert_eq!(repo.time_period, "2w");

    for reference in [repo.id.as_str(), "acme/web", "ACME/Web", "web"] {
        assert_eq!(h.svc.get_repository(reference).await.unwrap().id, repo.id);
    }
    assert!(matches!(
        h.svc.get_repository("acme/api").await.unwrap_err(),
        FlakeguardError::NotFound { .. }
    ));
    assert_eq!(h.svc.list_repositories().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_repository_conflicts() {
    let h = harness();
    onboard(&h.svc, None).await;
    let err = h
        .svc
        .create_repository(&repository(json!({ "owner": "Acme", "name": "WEB" })))
        .await
        .unwrap_err();
    assert!(matches!(err, FlakeguardError::Conflict(_)));
}

#[tokio::test]
async fn onboarding_validates_every_field() {
    let h = harness();
    let err = h
        .svc
        .create_repository(&repository(json!({
            "owner": "",
            "name": "a/b",
            "failureThreshold": 101,
            "timePeriod": "soon",
        })))
        .await
        .unwrap_err();
    let FlakeguardError::Validation(v) = err else {
        panic!("expected validation error");
    };
    let fields: Vec<&str> = v.errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["owner", "name", "failureThreshold", "timePeriod"]);
}

#[tokio::test]
async fn dashboard_shows_tier_recommendation() {
    let h = harness();
    h.svc
        .create_repository(&repository(json!({
            "owner": "acme",
            "name": "web",
            "testCount": 250,
        })))
        .await
        .unwrap();
    ingest_suite(&h.svc, "acme/web").await;

    let dash = h.svc.dashboard("acme/web").await.unwrap();
    assert_eq!(dash.recommendation.tier, SizeTier::Medium);
    assert_eq!(dash.thresholds.flake_threshold, 10.0);
    assert_eq!(dash.thresholds.failure_threshold, 15.0);
    assert_eq!(dash.thresholds.flake_source, ThresholdSource::Recommendation);
    assert_eq!(dash.tests.len(), 2);
    assert_eq!(dash.excluded_count, 1);
    assert!(dash.guardrail_flags.is_empty());
}

// ---- ticket creation ----

#[tokio::test]
async fn ticket_uses_default_board_and_templates() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;
    let id = pays_id("acme", "web");

    let resp = h
        .svc
        .create_ticket(&ticket_request(json!({
            "testId": id.0,
            "repository": "acme/web",
        })))
        .await
        .unwrap();
    assert_eq!(resp.ticket.key, "QA-1");
    assert_eq!(resp.ticket.url, "https://jira.example/browse/QA-1");

    let created = h.gateway.created();
    assert_eq!(created[0].summary, format!("Flaky test: pays ({CHECKOUT})"));

    let test = h.store.get_test(&id).await.unwrap();
    assert_eq!(test.jira_ticket.unwrap().key, "QA-1");
}

#[tokio::test]
async fn explicit_board_and_summary_win() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;

    let resp = h
        .svc
        .create_ticket(&ticket_request(json!({
            "testId": pays_id("acme", "web").0,
            "repository": "web",
            "board": "OPS",
            "summary": "Checkout flakes on CI",
        })))
        .await
        .unwrap();
    assert_eq!(resp.ticket.key, "OPS-1");
    assert_eq!(h.gateway.created()[0].summary, "Checkout flakes on CI");
}

#[tokio::test]
async fn ticket_without_any_board_is_invalid() {
    let h = harness();
    onboard(&h.svc, None).await;
    ingest_suite(&h.svc, "acme/web").await;

    let err = h
        .svc
        .create_ticket(&ticket_request(json!({
            "testId": pays_id("acme", "web").0,
            "repository": "acme/web",
        })))
        .await
        .unwrap_err();
    let FlakeguardError::Validation(v) = err else {
        panic!("expected validation error");
    };
    assert_eq!(v.errors[0].field, "board");
    assert!(h.gateway.created().is_empty());
}

#[tokio::test]
async fn ticket_requires_fields() {
    let h = harness();
    let err = h
        .svc
        .create_ticket(&ticket_request(json!({})))
        .await
        .unwrap_err();
    let FlakeguardError::Validation(v) = err else {
        panic!("expected validation error");
    };
    let fields: Vec<&str> = v.errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec!["testId", "repository"]);
}

#[tokio::test]
async fn ticket_for_test_of_another_repository_is_not_found() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;
    h.svc
        .create_repository(&repository(json!({ "owner": "acme", "name": "api" })))
        .await
        .unwrap();

    let err = h
        .svc
        .create_ticket(&ticket_request(json!({
            "testId": pays_id("acme", "web").0,
            "repository": "acme/api",
            "board": "QA",
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, FlakeguardError::NotFound { kind: "test", .. }));
}

#[tokio::test]
async fn tracker_failure_fails_ticket_creation() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;
    h.gateway.fail_next(JiraError::Timeout);

    let err = h
        .svc
        .create_ticket(&ticket_request(json!({
            "testId": pays_id("acme", "web").0,
            "repository": "acme/web",
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, FlakeguardError::Upstream(_)));
    let test = h.store.get_test(&pays_id("acme", "web")).await.unwrap();
    assert!(test.jira_ticket.is_none());
}

#[tokio::test]
async fn disabled_ticketing_fails_creation_as_upstream() {
    let (svc, _) = harness_with_gateway(DisabledGateway);
    onboard(&svc, Some("QA")).await;
    ingest_suite(&svc, "acme/web").await;

    let err = svc
        .create_ticket(&ticket_request(json!({
            "testId": pays_id("acme", "web").0,
            "repository": "acme/web",
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, FlakeguardError::Upstream(msg) if msg.contains("not configured")));
}

// ---- ticket cache ----

#[tokio::test]
async fn refresh_links_matching_tickets_with_one_search() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;
    h.gateway
        .seed("QA", "QA-7", &format!("Flaky test: pays ({CHECKOUT})"));

    let summary = h.svc.refresh_ticket_cache("acme/web").await.unwrap();
    assert!(summary.searched);
    assert_eq!(summary.tickets_found, 1);
    assert_eq!(summary.tests_checked, 2);
    assert_eq!(summary.tests_linked, 1);
    assert_eq!(h.gateway.search_count(), 1);

    // Freshly checked: the dashboard does not search again.
    let dash = h.svc.dashboard("acme/web").await.unwrap();
    assert_eq!(h.gateway.search_count(), 1);
    let pays = dash.tests.iter().find(|t| t.name == "pays").unwrap();
    assert_eq!(pays.jira_ticket.as_ref().unwrap().key, "QA-7");
}

#[tokio::test]
async fn dashboard_refreshes_stale_cache() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;
    h.gateway
        .seed("QA", "QA-9", &format!("Flaky test: pays ({CHECKOUT})"));

    let dash = h.svc.dashboard("acme/web").await.unwrap();
    assert_eq!(h.gateway.search_count(), 1);
    let pays = dash.tests.iter().find(|t| t.name == "pays").unwrap();
    assert_eq!(pays.jira_ticket.as_ref().unwrap().key, "QA-9");

    let excluded = h.svc.excluded_tests("acme/web", None, None).await.unwrap();
    assert_eq!(excluded.tests[0].jira_ticket.as_ref().unwrap().key, "QA-9");
}

#[tokio::test]
async fn expired_cache_is_searched_again() {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MemoryTicketGateway::new());
    let svc = FlakeService::new(store, gateway.clone(), Arc::new(NoChangeDetector))
        .with_ticket_ttl(Duration::zero());
    onboard(&svc, Some("QA")).await;
    ingest_suite(&svc, "acme/web").await;

    svc.dashboard("acme/web").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    svc.dashboard("acme/web").await.unwrap();
    assert_eq!(gateway.search_count(), 2);
}

#[tokio::test]
async fn dashboard_ignores_lookup_failures() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;
    h.gateway.fail_next(JiraError::RateLimited);

    let dash = h.svc.dashboard("acme/web").await.unwrap();
    assert!(dash.tests.iter().all(|t| t.jira_ticket.is_none()));
}

#[tokio::test]
async fn explicit_refresh_surfaces_lookup_failures() {
    let h = harness();
    onboard(&h.svc, Some("QA")).await;
    ingest_suite(&h.svc, "acme/web").await;
    h.gateway.fail_next(JiraError::Unauthorized);

    let err = h.svc.refresh_ticket_cache("acme/web").await.unwrap_err();
    assert!(matches!(err, FlakeguardError::Upstream(_)));
}

#[tokio::test]
async fn refresh_is_skipped_without_board_or_tracker() {
    let h = harness();
    onboard(&h.svc, None).await;
    let summary = h.svc.refresh_ticket_cache("acme/web").await.unwrap();
    assert!(!summary.searched);
    assert!(summary.skipped_reason.is_some());
    assert_eq!(h.gateway.search_count(), 0);

    let (svc, _) = harness_with_gateway(DisabledGateway);
    onboard(&svc, Some("QA")).await;
    let summary = svc.refresh_ticket_cache("acme/web").await.unwrap();
    assert_eq!(
        summary.skipped_reason.as_deref(),
        Some("ticketing is not configured")
    );
}
