//! Ticket creation and the per-test ticket cache.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use flakeguard_jira::{NewTicket, Ticket};
use flakeguard_state::{JiraTicketRef, RepositoryRecord, TestRecord};

use super::{repo_key, test_key, FlakeService};
use crate::domain::{
    CreateTicketRequest, CreatedTicket, Result, TicketRefreshSummary, TicketResponse,
    ValidationError,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::thresholds::EffectiveThresholds;
use crate::validation::validate_ticket_request;

const MAX_SUMMARY_CHARS: usize = 255;

/// `Flaky test: <name> (<file>)`, cut to the tracker's summary limit.
pub fn default_summary(test: &TestRecord) -> String {
    format!("Flaky test: {} ({})", test.name, test.file)
        .chars()
        .take(MAX_SUMMARY_CHARS)
        .collect()
}

pub fn default_description(test: &TestRecord, thresholds: &EffectiveThresholds) -> String {
    format!(
        "The test \"{name}\" in {file} has been flagged as flaky.\n\n\
         Flake rate: {flake:.1}% (threshold {flake_threshold:.1}%)\n\
         Failure rate: {failure:.1}% (threshold {failure_threshold:.1}%)\n\
         Runs considered: {runs}\n\n\
         Reported by Flakeguard.",
        name = test.name,
        file = test.file,
        flake = test.flake_rate,
        flake_threshold = thresholds.flake_threshold,
        failure = test.failure_rate,
        failure_threshold = thresholds.failure_threshold,
        runs = test.runs_considered,
    )
}

/// Newest ticket whose summary names the test, preferring one that also
/// names its spec file. `tickets` is newest first.
pub fn match_ticket<'a>(test: &TestRecord, tickets: &'a [Ticket]) -> Option<&'a Ticket> {
    let name = test.name.to_lowercase();
    let file = test.file.to_lowercase();
    let mut fallback = None;
    for ticket in tickets {
        let summary = ticket.summary.to_lowercase();
        if !summary.contains(&name) {
            continue;
        }
        if summary.contains(&file) {
            return Some(ticket);
        }
        fallback.get_or_insert(ticket);
    }
    fallback
}

fn skipped(reason: &str) -> TicketRefreshSummary {
    TicketRefreshSummary {
        skipped_reason: Some(reason.to_string()),
        ..Default::default()
    }
}

impl FlakeService {
    /// File a ticket for a test and cache the reference on the test.
    ///
    /// Tracker failures fail the request.
    pub async fn create_ticket(&self, req: &CreateTicketRequest) -> Result<TicketResponse> {
        validate_ticket_request(req)?;
        let repo = self.resolve_repository(&req.repository).await?;
        let test = self.load_test(&req.test_id, Some(&repo.id)).await?;

        let board = req
            .board
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .or_else(|| repo.default_jira_board.clone())
            .ok_or_else(|| {
                ValidationError::field("board", "is required when the repository has no default Jira board")
            })?;

        let settings = self.store.load_settings().await?;
        let thresholds = EffectiveThresholds::resolve(&repo, &settings);
        let new_ticket = NewTicket {
            board,
            summary: req
                .summary
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_summary(&test)),
            description: req
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| default_description(&test, &thresholds)),
        };

        let ticket = self.gateway.create_ticket(&new_ticket).await?;
        METRICS.inc_tickets_created();
        obs::emit_ticket_created(test.id.as_str(), &ticket.key);

        {
            let _repo_guard = self.locks.lock(&repo_key(&repo.id)).await;
            let _test_guard = self.locks.lock(&test_key(&test.id)).await;
            let now = Utc::now();
            let mut current = self.store.get_test(&test.id).await?;
            current.jira_ticket = Some(JiraTicketRef {
                key: ticket.key.clone(),
                url: ticket.url.clone(),
            });
            current.ticket_checked_at = Some(now);
            current.updated_at = now;
            if let Err(err) = self.store.upsert_test(&current).await {
                warn!(test_id = %test.id, key = %ticket.key, error = %err, "ticket created but not linked to test");
                return Err(err.into());
            }
        }

        Ok(TicketResponse {
            ticket: CreatedTicket {
                id: ticket.id,
                key: ticket.key,
                url: ticket.url,
            },
        })
    }

    /// Link tests without a ticket to matching tickets on the repository's
    /// default board. One search per repository.
    pub async fn refresh_ticket_cache(&self, reference: &str) -> Result<TicketRefreshSummary> {
        let repo = self.resolve_repository(reference).await?;
        self.refresh_tickets_for(&repo).await
    }

    pub(super) async fn refresh_tickets_for(
        &self,
        repo: &RepositoryRecord,
    ) -> Result<TicketRefreshSummary> {
        if !self.gateway.is_enabled() {
            return Ok(skipped("ticketing is not configured"));
        }
        let Some(board) = repo.default_jira_board.as_deref() else {
            return Ok(skipped("repository has no default Jira board"));
        };

        let tickets = self.gateway.find_tickets(board).await?;
        let now = Utc::now();

        let _repo_guard = self.locks.lock(&repo_key(&repo.id)).await;
        let mut summary = TicketRefreshSummary {
            searched: true,
            tickets_found: tickets.len(),
            ..Default::default()
        };
        for mut test in self.store.list_tests(&repo.id).await? {
            if test.jira_ticket.is_some() {
                continue;
            }
            summary.tests_checked += 1;
            if let Some(ticket) = match_ticket(&test, &tickets) {
                test.jira_ticket = Some(JiraTicketRef {
                    key: ticket.key.clone(),
                    url: ticket.url.clone(),
                });
                summary.tests_linked += 1;
            }
            test.ticket_checked_at = Some(now);
            self.store.upsert_test(&test).await?;
        }

        info!(
            repository = %repo.full_name(),
            board = %board,
            tickets_found = summary.tickets_found,
            tests_linked = summary.tests_linked,
            "ticket cache refreshed"
        );
        Ok(summary)
    }

    /// Whether some ticketless test has not been checked recently.
    pub(super) fn ticket_cache_stale(
        &self,
        repo: &RepositoryRecord,
        tests: &[TestRecord],
        now: DateTime<Utc>,
    ) -> bool {
        self.gateway.is_enabled()
            && repo.default_jira_board.is_some()
            && tests.iter().any(|t| {
                t.jira_ticket.is_none()
                    && t
                        .ticket_checked_at
                        .map_or(true, |at| now - at > self.ticket_ttl)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdSource;
    use flakeguard_state::RepositoryId;

    fn test_record() -> TestRecord {
        let mut t = TestRecord::new(
            RepositoryId::derive("acme", "web"),
            "cypress/e2e/login.cy.ts",
            "logs in",
        );
        t.flake_rate = 33.333;
        t.failure_rate = 12.5;
        t.runs_considered = 8;
        t
    }

    fn ticket(key: &str, summary: &str) -> Ticket {
        Ticket {
            id: key.to_string(),
            key: key.to_string(),
            url: format!("https://jira.example/browse/{key}"),
            summary: summary.to_string(),
        }
    }

    #[test]
    fn default_summary_names_test_and_file() {
        assert_eq!(
            default_summary(&test_record()),
            "Flaky test: logs in (cypress/e2e/login.cy.ts)"
        );

        let mut long = test_record();
        long.name = "x".repeat(400);
        assert_eq!(default_summary(&long).chars().count(), 255);
    }

    #[test]
    fn default_description_is_deterministic() {
        let th = EffectiveThresholds {
            flake_threshold: 10.0,
            failure_threshold: 20.0,
            flake_source: ThresholdSource::Repository,
            failure_source: ThresholdSource::Recommendation,
        };
        let a = default_description(&test_record(), &th);
        assert_eq!(a, default_description(&test_record(), &th));
        assert!(a.contains("Flake rate: 33.3% (threshold 10.0%)"));
        assert!(a.contains("Failure rate: 12.5% (threshold 20.0%)"));
        assert!(a.contains("Runs considered: 8"));
    }

    #[test]
    fn match_prefers_ticket_naming_the_file() {
        let tickets = vec![
            ticket("QA-3", "Flaky: logs in"),
            ticket("QA-2", "Flaky test: logs in (cypress/e2e/login.cy.ts)"),
            ticket("QA-1", "Unrelated"),
        ];
        assert_eq!(match_ticket(&test_record(), &tickets).unwrap().key, "QA-2");
        assert_eq!(
            match_ticket(&test_record(), &tickets[..1]).unwrap().key,
            "QA-3"
        );
        assert!(match_ticket(&test_record(), &tickets[2..]).is_none());
    }
}
