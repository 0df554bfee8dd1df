//! Request handlers. Each one unpacks the request, calls one service
//! operation and wraps the result in the envelope.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use flakeguard_core::{
    AnalysisSummary, CreateRepositoryRequest, CreateTicketRequest, ExcludedTest,
    ExclusionChange, GlobalSettings, IngestRequest, IngestResponse, RepositoryDashboard,
    RepositoryRecord, SpecPatternResponse, ThresholdUpdate, ThresholdUpdateResponse,
    TicketRefreshSummary, TicketResponse, ToggleRequest, VerdictRecord,
};

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::AppState;

type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub store: String,
    pub ticketing_enabled: bool,
}

pub async fn health(State(state): State<AppState>) -> ApiResponse<Health> {
    ApiResponse::ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_backend.clone(),
        ticketing_enabled: state.service.ticketing_enabled(),
    })
}

pub async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> ApiResult<IngestResponse> {
    let Json(req) = payload?;
    let resp = state.service.ingest(&req).await?;
    let message = format!("{} newly classified flaky tests", resp.newly_flaky_tests);
    Ok(ApiResponse::ok(resp).with_message(message))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedQuery {
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub flake_threshold: Option<String>,
    #[serde(default)]
    pub failure_threshold: Option<String>,
}

/// `data` is the bare list so CI scripts can iterate it directly; the
/// thresholds applied go in `message`.
pub async fn excluded_tests(
    State(state): State<AppState>,
    query: Result<Query<ExcludedQuery>, QueryRejection>,
) -> ApiResult<Vec<ExcludedTest>> {
    let Query(q) = query?;
    let resp = state
        .service
        .excluded_tests(
            &q.repo,
            q.flake_threshold.as_deref(),
            q.failure_threshold.as_deref(),
        )
        .await?;
    let message = format!(
        "{} excluded tests in {} (flake threshold {:.1}%, failure threshold {:.1}%)",
        resp.tests.len(),
        resp.repository,
        resp.thresholds.flake_threshold,
        resp.thresholds.failure_threshold,
    );
    Ok(ApiResponse::ok(resp.tests).with_message(message))
}

pub async fn excluded_pattern(
    State(state): State<AppState>,
    query: Result<Query<ExcludedQuery>, QueryRejection>,
) -> ApiResult<SpecPatternResponse> {
    let Query(q) = query?;
    Ok(ApiResponse::ok(
        state.service.spec_exclusion_pattern(&q.repo).await?,
    ))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    payload: Result<Json<CreateTicketRequest>, JsonRejection>,
) -> ApiResult<TicketResponse> {
    let Json(req) = payload?;
    Ok(ApiResponse::created(state.service.create_ticket(&req).await?))
}

pub async fn toggle(
    State(state): State<AppState>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> ApiResult<ExclusionChange> {
    let Json(req) = payload?;
    Ok(ApiResponse::ok(state.service.toggle(&req).await?))
}

pub async fn list_repositories(State(state): State<AppState>) -> ApiResult<Vec<RepositoryRecord>> {
    Ok(ApiResponse::ok(state.service.list_repositories().await?))
}

pub async fn create_repository(
    State(state): State<AppState>,
    payload: Result<Json<CreateRepositoryRequest>, JsonRejection>,
) -> ApiResult<RepositoryRecord> {
    let Json(req) = payload?;
    Ok(ApiResponse::created(
        state.service.create_repository(&req).await?,
    ))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<RepositoryDashboard> {
    Ok(ApiResponse::ok(state.service.dashboard(&id).await?))
}

pub async fn update_thresholds(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ThresholdUpdate>, JsonRejection>,
) -> ApiResult<ThresholdUpdateResponse> {
    let Json(update) = payload?;
    Ok(ApiResponse::ok(
        state.service.update_thresholds(&id, &update).await?,
    ))
}

pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AnalysisSummary> {
    Ok(ApiResponse::ok(state.service.analyze_repository(&id).await?))
}

pub async fn refresh_tickets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<TicketRefreshSummary> {
    Ok(ApiResponse::ok(
        state.service.refresh_ticket_cache(&id).await?,
    ))
}

pub async fn verdicts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<VerdictRecord>> {
    Ok(ApiResponse::ok(state.service.list_verdicts(&id).await?))
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<GlobalSettings> {
    Ok(ApiResponse::ok(state.service.get_settings().await?))
}

pub async fn put_settings(
    State(state): State<AppState>,
    payload: Result<Json<GlobalSettings>, JsonRejection>,
) -> ApiResult<GlobalSettings> {
    let Json(settings) = payload?;
    Ok(ApiResponse::ok(state.service.put_settings(settings).await?))
}
