//! In-memory ticket gateway (testing only)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{JiraError, NewTicket, Result, Ticket, TicketGateway};

/// Records created tickets and serves them back from `find_tickets`.
#[derive(Debug, Default)]
pub struct MemoryTicketGateway {
    tickets: Mutex<Vec<(String, Ticket)>>,
    fail_next: Mutex<Option<JiraError>>,
    searches: AtomicUsize,
}

impl MemoryTicketGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a ticket on `board`, as if someone filed it by hand.
    pub fn seed(&self, board: &str, key: &str, summary: &str) {
        let mut tickets = self.tickets.lock().unwrap();
        let id = (10_000 + tickets.len()).to_string();
        tickets.push((
            board.to_string(),
            Ticket {
                id,
                key: key.to_string(),
                url: format!("https://jira.example/browse/{key}"),
                summary: summary.to_string(),
            },
        ));
    }

    /// Make the next call fail with `err`.
    pub fn fail_next(&self, err: JiraError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Tickets created or seeded so far.
    pub fn created(&self) -> Vec<Ticket> {
        self.tickets
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    /// Number of `find_tickets` calls.
    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::Relaxed)
    }

    fn take_failure(&self) -> Result<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TicketGateway for MemoryTicketGateway {
    async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket> {
        self.take_failure()?;
        let mut tickets = self.tickets.lock().unwrap();
        let n = tickets.len() + 1;
        let key = format!("{}-{}", ticket.board, n);
        let created = Ticket {
            id: (10_000 + n).to_string(),
            url: format!("https://jira.example/browse/{key}"),
            key,
            summary: ticket.summary.clone(),
        };
        tickets.push((ticket.board.clone(), created.clone()));
        Ok(created)
    }

    async fn find_tickets(&self, board: &str) -> Result<Vec<Ticket>> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.take_failure()?;
        let tickets = self.tickets.lock().unwrap();
        Ok(tickets
            .iter()
            .rev()
            .filter(|(b, _)| b == board)
            .map(|(_, t)| t.clone())
            .collect())
    }
}
