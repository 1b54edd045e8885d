use reqwest::StatusCode;
use thiserror::Error;

/// Boxed error carried back from a persistence sink.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by [`Runner`](crate::Runner) construction and start-up.
/// Everything after the run has been dispatched is either counted as a failed
/// request or logged; it never propagates out of `start`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid run configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("failed to persist Running status for worker {worker_id}")]
    StatusPersist {
        worker_id: u32,
        #[source]
        source: SinkError,
    },
}

/// Errors from the token cache. All of them leave the cached entry untouched,
/// so the next `get_token` call retries the refresh.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token request failed")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned status {0}")]
    Status(StatusCode),

    #[error("malformed token response")]
    Malformed(#[source] serde_json::Error),
}

/// Errors from statistic computation. These abort only the statistics step;
/// the run's terminal status is decided before metrics are computed.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("percentile rank {0} outside the valid 0-100 range")]
    InvalidRank(f64),
}
