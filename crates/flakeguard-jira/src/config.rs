//! Jira connection settings

use std::time::Duration;

/// Label attached to every ticket Flakeguard creates; used for lookups.
pub const FLAKY_TEST_LABEL: &str = "flaky-test";

/// Jira connection settings
#[derive(Debug, Clone)]
pub struct JiraConfig {
    /// Site URL, e.g. "https://acme.atlassian.net" (no trailing slash)
    pub base_url: String,
    /// Account email for basic auth
    pub email: Option<String>,
    /// API token for basic auth
    pub api_token: Option<String>,
    /// Issue type name for created tickets (default: "Bug")
    pub issue_type: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl JiraConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            email: None,
            api_token: None,
            issue_type: "Bug".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set basic-auth credentials
    pub fn with_credentials(mut self, email: impl Into<String>, api_token: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self.api_token = Some(api_token.into());
        self
    }

    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.issue_type = issue_type.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - JIRA_BASE_URL (required; `None` when unset means ticketing is disabled)
    /// - JIRA_EMAIL, JIRA_API_TOKEN (optional, basic auth)
    /// - JIRA_ISSUE_TYPE (optional, default: "Bug")
    /// - JIRA_TIMEOUT_SECS (optional, default: 10)
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("JIRA_BASE_URL").ok().filter(|v| !v.trim().is_empty())?;
        let mut config = Self::new(base_url);
        config.email = std::env::var("JIRA_EMAIL").ok();
        config.api_token = std::env::var("JIRA_API_TOKEN").ok();
        if let Ok(issue_type) = std::env::var("JIRA_ISSUE_TYPE") {
            config.issue_type = issue_type;
        }
        if let Some(secs) = std::env::var("JIRA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        Some(config)
    }

    /// Browser URL of an issue
    pub fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.base_url, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = JiraConfig::new("https://acme.atlassian.net/");
        assert_eq!(
            config.browse_url("QA-12"),
            "https://acme.atlassian.net/browse/QA-12"
        );
    }

    #[test]
    fn defaults() {
        let config = JiraConfig::new("https://jira.example");
        assert_eq!(config.issue_type, "Bug");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.email.is_none());
    }
}
