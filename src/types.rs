use crate::error::Error;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Environment
// ============================================================================

/// Credentials used against an environment's token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    /// Username/password pair, sent as HTTP basic auth on the grant request.
    Basic { username: String, password: String },
    /// Pre-encoded basic-auth value (the part after `Basic `).
    BasicAuthToken(String),
}

/// A registered HTTP target. Read-only to the engine: the snapshot handed to
/// a [`Runner`](crate::Runner) is immutable for the duration of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: u32,
    pub name: String,
    pub endpoint: String,
    /// Full URL of the token-issuing endpoint, when the target requires a
    /// bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub disabled: bool,
}

// ============================================================================
// Run configuration
// ============================================================================

/// Immutable configuration for one run. Total request count is
/// `concurrency * requests_per_task`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub environment_id: u32,
    /// Number of parallel executor tasks in the pool.
    pub concurrency: u32,
    /// Requests each pool slot issues sequentially.
    pub requests_per_task: u32,
    /// GET or POST; anything else fails validation.
    pub method: Method,
    /// Opaque request body, sent only for POST.
    pub body: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Upper bound on the randomized pacing delay between requests. Zero
    /// disables pacing.
    pub max_jitter: Duration,
}

impl RunConfig {
    pub fn new(
        environment_id: u32,
        concurrency: u32,
        requests_per_task: u32,
        method: Method,
    ) -> Self {
        Self {
            environment_id,
            concurrency,
            requests_per_task,
            method,
            body: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_jitter: Duration::from_secs(1),
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.concurrency as u64 * self.requests_per_task as u64
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.environment_id < 1 {
            return Err(Error::InvalidConfig("environment_id must be >= 1".into()));
        }
        if self.concurrency < 1 {
            return Err(Error::InvalidConfig("concurrency must be >= 1".into()));
        }
        if self.requests_per_task < 1 {
            return Err(Error::InvalidConfig(
                "requests_per_task must be >= 1".into(),
            ));
        }
        if self.method != Method::GET && self.method != Method::POST {
            return Err(Error::InvalidConfig(format!(
                "unsupported HTTP method: {}",
                self.method
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Run status
// ============================================================================

/// Lifecycle status of a run. Transitions are monotonic:
/// `Created -> Running -> {Finished | Failed}`; the terminal states never
/// transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Created,
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Finished | RunStatus::Failed)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Created, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Finished)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Created => "Created",
            RunStatus::Running => "Running",
            RunStatus::Finished => "Finished",
            RunStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_total_requests_is_product() {
        let config = RunConfig::new(1, 4, 25, Method::GET);
        assert_eq!(config.total_requests(), 100);
    }

    #[test]
    fn config_rejects_zero_concurrency() {
        let config = RunConfig::new(1, 0, 10, Method::GET);
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_zero_requests_per_task() {
        let config = RunConfig::new(1, 10, 0, Method::GET);
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_unsupported_method() {
        let config = RunConfig::new(1, 1, 1, Method::DELETE);
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_zero_environment_id() {
        let config = RunConfig::new(0, 1, 1, Method::GET);
        assert!(config.validate().is_err());
    }

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(RunStatus::Created.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Finished));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));

        assert!(!RunStatus::Created.can_transition_to(RunStatus::Finished));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Created));
        assert!(!RunStatus::Finished.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Finished));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Created.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Finished.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
