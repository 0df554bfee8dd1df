//! flakeguardd - Flakeguard HTTP service
//!
//! Configuration comes from flags or environment variables (a `.env` file is
//! honoured). Store selection follows `StoreConfig::from_env`; ticketing is
//! enabled when `JIRA_BASE_URL` is set.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use flakeguard_core::metrics::METRICS;
use flakeguard_core::telemetry::{init_tracing, parse_level};
use flakeguard_core::{
    FlakeService, GitChangeDetector, NoChangeDetector, SpecChangeDetector,
};
use flakeguard_jira::{DisabledGateway, JiraClient, JiraConfig, TicketGateway};
use flakeguard_state::StoreHandle;
use flakeguardd::{router, AppState};

#[derive(Parser)]
#[command(name = "flakeguardd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Flaky-test tracking service for Cypress suites", long_about = None)]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "FLAKEGUARD_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "FLAKEGUARD_LOG_JSON")]
    json: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "FLAKEGUARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Directory holding `<owner>/<repo>` git checkouts for spec-change
    /// detection. Without it, every commit counts as leaving specs untouched.
    #[arg(long, env = "FLAKEGUARD_CHECKOUT_ROOT")]
    checkout_root: Option<PathBuf>,

    /// Minutes a "no ticket found" answer is trusted by the dashboard
    #[arg(long, env = "FLAKEGUARD_TICKET_TTL_MINUTES", default_value_t = 10)]
    ticket_ttl_minutes: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = parse_level(&cli.log_level)
        .with_context(|| format!("unknown log level '{}'", cli.log_level))?;
    init_tracing(cli.json, level);

    let handle = StoreHandle::from_env();
    let backend = handle.config().describe();
    let store = handle
        .get()
        .await
        .with_context(|| format!("failed to open store {backend}"))?;
    info!(store = %backend, "store ready");

    let gateway: Arc<dyn TicketGateway> = match JiraConfig::from_env() {
        Some(config) => {
            info!(base_url = %config.base_url, "Jira ticketing enabled");
            Arc::new(JiraClient::new(config).context("failed to build Jira client")?)
        }
        None => {
            warn!("JIRA_BASE_URL not set, ticketing disabled");
            Arc::new(DisabledGateway)
        }
    };

    let detector: Arc<dyn SpecChangeDetector> = match cli.checkout_root {
        Some(root) => {
            info!(checkout_root = %root.display(), "spec-change detection enabled");
            Arc::new(GitChangeDetector::new(root))
        }
        None => Arc::new(NoChangeDetector),
    };

    let service = FlakeService::new(store, gateway, detector)
        .with_ticket_ttl(chrono::Duration::minutes(cli.ticket_ttl_minutes));
    let app = router(AppState::new(service, backend));

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(addr = %cli.bind, "flakeguardd listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
    }

    METRICS.flush();
    info!("flakeguardd stopped");
    Ok(())
}
