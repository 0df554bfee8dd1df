//! Error types for flakeguard-jira

use thiserror::Error;

/// Errors that can occur while talking to Jira
#[derive(Error, Debug)]
pub enum JiraError {
    /// Ticketing is disabled (no `JIRA_BASE_URL`)
    #[error("Jira is not configured")]
    NotConfigured,

    /// Network-level error during HTTP communication
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Credentials rejected
    #[error("Jira rejected the credentials")]
    Unauthorized,

    /// Too many requests
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Response body did not have the expected shape
    #[error("Invalid response from Jira: {0}")]
    InvalidResponse(String),

    /// Jira returned an error status
    #[error("Jira API error: {status} - {message}")]
    Api { status: u16, message: String },
}

impl JiraError {
    /// Whether a single retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            JiraError::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            JiraError::Timeout => true,
            JiraError::RateLimited => true,
            JiraError::Api { status, .. } => *status >= 500,
            JiraError::NotConfigured | JiraError::Unauthorized | JiraError::InvalidResponse(_) => {
                false
            }
        }
    }

    /// Whether the request certainly never created anything on the server,
    /// so sending it again cannot duplicate it. Used for non-idempotent
    /// calls such as issue creation.
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            JiraError::Network(e) => e.is_connect(),
            JiraError::RateLimited => true,
            _ => false,
        }
    }

    /// Classify a non-success HTTP status.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => JiraError::Unauthorized,
            429 => JiraError::RateLimited,
            _ => JiraError::Api {
                status,
                message: body,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        assert!(JiraError::from_status(503, "busy".into()).is_retryable());
        assert!(JiraError::from_status(429, String::new()).is_retryable());
        assert!(JiraError::Timeout.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!JiraError::from_status(400, "bad field".into()).is_retryable());
        assert!(matches!(
            JiraError::from_status(401, String::new()),
            JiraError::Unauthorized
        ));
        assert!(!JiraError::NotConfigured.is_retryable());
    }

    #[test]
    fn only_unprocessed_requests_are_safe_to_resend() {
        assert!(JiraError::from_status(429, String::new()).is_safe_to_resend());
        assert!(!JiraError::from_status(502, "bad gateway".into()).is_safe_to_resend());
        assert!(!JiraError::Timeout.is_safe_to_resend());
        assert!(!JiraError::InvalidResponse("eof".into()).is_safe_to_resend());
    }
}
