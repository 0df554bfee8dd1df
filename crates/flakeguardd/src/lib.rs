//! Flakeguard HTTP service.
//!
//! ## Layer 3 - Surface
//!
//! Exposes [`FlakeService`] over a JSON API. Responses use the envelope
//! `{status: "success" | "error", data?, message?}`.

pub mod error;
mod handlers;
pub mod response;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use flakeguard_core::FlakeService;

pub use error::ApiError;
pub use response::ApiResponse;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FlakeService>,
    /// Credential-free description of the store, for `/health`
    pub store_backend: String,
}

impl AppState {
    pub fn new(service: FlakeService, store_backend: impl Into<String>) -> Self {
        Self {
            service: Arc::new(service),
            store_backend: store_backend.into(),
        }
    }
}

/// Every route, with request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/ingest", post(handlers::ingest))
        .route("/api/excluded-tests", get(handlers::excluded_tests))
        .route("/api/excluded-tests/pattern", get(handlers::excluded_pattern))
        .route("/api/tickets", post(handlers::create_ticket))
        .route("/api/tests/toggle", post(handlers::toggle))
        .route(
            "/api/repositories",
            get(handlers::list_repositories).post(handlers::create_repository),
        )
        .route("/api/repositories/{id}", get(handlers::dashboard))
        .route(
            "/api/repositories/{id}/thresholds",
            put(handlers::update_thresholds),
        )
        .route("/api/repositories/{id}/analyze", post(handlers::analyze))
        .route(
            "/api/repositories/{id}/tickets/refresh",
            post(handlers::refresh_tickets),
        )
        .route("/api/repositories/{id}/verdicts", get(handlers::verdicts))
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
