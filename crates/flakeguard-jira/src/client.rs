//! Jira REST v2 client

use std::future::Future;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::config::{JiraConfig, FLAKY_TEST_LABEL};
use crate::error::JiraError;
use crate::{NewTicket, Result, Ticket, TicketGateway};

const SEARCH_PAGE_SIZE: u32 = 500;

/// Jira client implementing [`TicketGateway`].
#[derive(Debug, Clone)]
pub struct JiraClient {
    http_client: Client,
    config: JiraConfig,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    id: String,
    key: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    jql: String,
    fields: Vec<&'static str>,
    #[serde(rename = "maxResults")]
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<SearchIssue>,
}

#[derive(Debug, Deserialize)]
struct SearchIssue {
    id: String,
    key: String,
    #[serde(default)]
    fields: SearchFields,
}

#[derive(Debug, Default, Deserialize)]
struct SearchFields {
    #[serde(default)]
    summary: String,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("flakeguard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match (&self.config.email, &self.config.api_token) {
            (Some(email), Some(token)) => request.basic_auth(email, Some(token)),
            _ => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                JiraError::Timeout
            } else {
                JiraError::Network(e)
            }
        })?;

        let status = response.status();
        debug!(status = %status, "Received response from Jira");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JiraError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }

    async fn create_inner(&self, ticket: &NewTicket) -> Result<Ticket> {
        let body = json!({
            "fields": {
                "project": { "key": ticket.board },
                "summary": ticket.summary,
                "description": ticket.description,
                "issuetype": { "name": self.config.issue_type },
                "labels": [FLAKY_TEST_LABEL],
            }
        });
        let url = format!("{}/rest/api/2/issue", self.config.base_url);
        let response = self.send(self.http_client.post(url).json(&body)).await?;
        let created: CreatedIssue = response
            .json()
            .await
            .map_err(|e| JiraError::InvalidResponse(e.to_string()))?;

        Ok(Ticket {
            url: self.config.browse_url(&created.key),
            id: created.id,
            key: created.key,
            summary: ticket.summary.clone(),
        })
    }

    async fn search_inner(&self, board: &str) -> Result<Vec<Ticket>> {
        let request = SearchRequest {
            jql: format!(
                "project = \"{}\" AND labels = \"{}\" ORDER BY created DESC",
                board.replace('"', ""),
                FLAKY_TEST_LABEL
            ),
            fields: vec!["summary"],
            max_results: SEARCH_PAGE_SIZE,
        };
        let url = format!("{}/rest/api/2/search", self.config.base_url);
        let response = self.send(self.http_client.post(url).json(&request)).await?;
        let found: SearchResponse = response
            .json()
            .await
            .map_err(|e| JiraError::InvalidResponse(e.to_string()))?;

        Ok(found
            .issues
            .into_iter()
            .map(|issue| Ticket {
                url: self.config.browse_url(&issue.key),
                id: issue.id,
                key: issue.key,
                summary: issue.fields.summary,
            })
            .collect())
    }
}

/// Run `op`, retrying exactly once if `retry` accepts the first failure.
async fn retry_once<T, F, Fut>(
    op_name: &str,
    retry: fn(&JiraError) -> bool,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(err) if retry(&err) => {
            warn!(op = op_name, error = %err, "Transient Jira failure, retrying once");
            op().await
        }
        other => other,
    }
}

#[async_trait]
impl TicketGateway for JiraClient {
    #[instrument(skip(self, ticket), fields(board = %ticket.board))]
    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket> {
        // Not idempotent: resend only when nothing reached Jira.
        retry_once("create_ticket", JiraError::is_safe_to_resend, || {
            self.create_inner(ticket)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn find_tickets(&self, board: &str) -> Result<Vec<Ticket>> {
        retry_once("find_tickets", JiraError::is_retryable, || self.search_inner(board)).await
    }
}
