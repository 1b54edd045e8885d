use crate::error::SinkError;
use crate::metrics::MetricsSnapshot;
use crate::types::RunStatus;

/// Persists run status transitions. Implemented by the storage collaborator;
/// the engine calls it once for the `Running` transition and once for the
/// terminal one.
pub trait StatusSink: Send + Sync {
    fn status_changed(&self, worker_id: u32, status: RunStatus) -> Result<(), SinkError>;
}

/// Persists the final metrics snapshot of a run. Called exactly once, after
/// the run has reached a terminal status.
pub trait MetricsSink: Send + Sync {
    fn metrics_ready(&self, worker_id: u32, snapshot: &MetricsSnapshot) -> Result<(), SinkError>;
}
