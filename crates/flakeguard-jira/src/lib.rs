//! Flakeguard-Jira: Ticketing gateway for flaky tests
//!
//! ## Layer 1 - Integration
//!
//! Creates tracking tickets for flaky tests and looks them up in one
//! batched search per board.
//!
//! ## Key Components
//!
//! - `TicketGateway`: backend-agnostic ticketing trait
//! - `JiraClient`: Jira REST v2 implementation (retries once on transient failures)
//! - `DisabledGateway`: stand-in when no Jira site is configured
//! - `fakes::MemoryTicketGateway`: in-memory implementation for tests

mod client;
mod config;
mod error;
pub mod fakes;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::JiraClient;
pub use config::{JiraConfig, FLAKY_TEST_LABEL};
pub use error::JiraError;

/// Result type for ticketing operations
pub type Result<T> = std::result::Result<T, JiraError>;

/// Fields for a new ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    /// Project key the ticket is filed under
    pub board: String,
    pub summary: String,
    pub description: String,
}

/// A ticket as known to the issue tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub key: String,
    pub url: String,
    #[serde(default)]
    pub summary: String,
}

/// Issue-tracker operations Flakeguard needs.
#[async_trait]
pub trait TicketGateway: Send + Sync {
    /// File a new ticket.
    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket>;

    /// Every Flakeguard-labelled ticket on `board`, newest first.
    async fn find_tickets(&self, board: &str) -> Result<Vec<Ticket>>;

    /// `false` when the gateway cannot reach any tracker.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Gateway used when ticketing is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledGateway;

#[async_trait]
impl TicketGateway for DisabledGateway {
    async fn create_ticket(&self, _ticket: &NewTicket) -> Result<Ticket> {
        Err(JiraError::NotConfigured)
    }

    async fn find_tickets(&self, _board: &str) -> Result<Vec<Ticket>> {
        Ok(Vec::new())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
