use crate::engine::worker::Worker;
use crate::error::Error;
use crate::http::create_client;
use crate::metrics::{LatencyAggregator, MetricsSnapshot};
use crate::sink::{MetricsSink, StatusSink};
use crate::token::TokenCache;
use crate::types::{Environment, RunConfig, RunStatus};
use futures_util::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Drives one load-generation run against an environment.
///
/// Construction yields an inert runner in `Created` status; [`Runner::start`]
/// performs the whole lifecycle and resolves once the run has reached a
/// terminal status and its snapshot has been handed to the metrics sink.
/// Callers that want fire-and-forget semantics spawn the returned future.
pub struct Runner {
    worker_id: u32,
    environment: Environment,
    config: RunConfig,
    status: Mutex<RunStatus>,
    metrics: Arc<LatencyAggregator>,
    cancel_token: CancellationToken,
}

impl Runner {
    /// Validates the configuration and binds the runner to an environment
    /// snapshot. The snapshot is expected to be enabled; rejecting disabled
    /// environments is the caller's responsibility.
    pub fn new(worker_id: u32, environment: Environment, config: RunConfig) -> Result<Self, Error> {
        config.validate()?;
        if worker_id < 1 {
            return Err(Error::InvalidConfig("worker_id must be >= 1".into()));
        }
        if config.environment_id != environment.id {
            return Err(Error::InvalidConfig(format!(
                "config targets environment {} but was bound to environment {}",
                config.environment_id, environment.id
            )));
        }
        if environment.token_endpoint.is_some() && environment.credentials.is_none() {
            return Err(Error::InvalidConfig(
                "environment has a token endpoint but no credentials".into(),
            ));
        }

        Ok(Self {
            worker_id,
            environment,
            config,
            status: Mutex::new(RunStatus::Created),
            metrics: Arc::new(LatencyAggregator::new()),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Handle for external cancellation. Cancelling flips the run onto the
    /// failure path; repeated cancels are no-ops.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn status(&self) -> RunStatus {
        *self.lock_status()
    }

    fn lock_status(&self) -> MutexGuard<'_, RunStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a lifecycle transition, rejecting anything non-monotonic:
    /// the prior value is kept and the attempt is logged.
    fn set_status(&self, next: RunStatus) {
        let mut status = self.lock_status();
        if status.can_transition_to(next) {
            *status = next;
        } else {
            tracing::warn!(
                worker_id = self.worker_id,
                current = %status,
                rejected = %next,
                "Rejected invalid status transition"
            );
        }
    }

    /// Runs the full lifecycle: persist and apply `Running`, drive the pool,
    /// race completion against cancellation, persist the terminal status and
    /// the final metrics snapshot.
    ///
    /// Only two conditions surface as `Err`: failure to build the HTTP client
    /// and failure to persist the `Running` transition. Both abort before any
    /// request is dispatched. Everything later is logged and the decided
    /// terminal status is returned.
    pub async fn start<S, M>(&self, status_sink: &S, metrics_sink: &M) -> Result<RunStatus, Error>
    where
        S: StatusSink,
        M: MetricsSink,
    {
        let client = create_client(
            self.config.concurrency,
            self.config.timeout,
            self.config.connect_timeout,
        )
        .map_err(Error::Client)?;

        // Persist first, then apply in memory: a run must not proceed with
        // stale persisted status.
        status_sink
            .status_changed(self.worker_id, RunStatus::Running)
            .map_err(|source| Error::StatusPersist {
                worker_id: self.worker_id,
                source,
            })?;
        self.set_status(RunStatus::Running);

        let token_cache = match (&self.environment.token_endpoint, &self.environment.credentials)
        {
            (Some(token_url), Some(credentials)) => Some(Arc::new(TokenCache::new(
                credentials.clone(),
                token_url.clone(),
                client.clone(),
            ))),
            _ => None,
        };

        let total = self.config.total_requests();
        tracing::info!(
            worker_id = self.worker_id,
            endpoint = %self.environment.endpoint,
            concurrency = self.config.concurrency,
            requests_per_task = self.config.requests_per_task,
            total,
            "Starting run"
        );

        // Shared bounded queue, pre-loaded with one token per request.
        let (task_tx, task_rx) = mpsc::channel::<u64>(total as usize);
        for seq in 0..total {
            // Capacity equals the token count, so this never blocks.
            let _ = task_tx.send(seq).await;
        }
        drop(task_tx);
        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));

        let start = Instant::now();
        let mut handles = Vec::with_capacity(self.config.concurrency as usize);
        for id in 0..self.config.concurrency {
            let worker = Worker::new(
                id,
                client.clone(),
                self.environment.endpoint.clone(),
                self.config.method.clone(),
                self.config.body.clone(),
                token_cache.clone(),
                self.metrics.clone(),
                task_rx.clone(),
                self.config.max_jitter,
            );
            handles.push(tokio::spawn(worker.run()));
        }

        // Race the join barrier against external cancellation. Cancellation
        // does not abort in-flight requests; they run to their own completion
        // or native timeout, and their samples may still be recorded after
        // the terminal status is set.
        let completed = tokio::select! {
            _ = join_all(handles) => true,
            _ = self.cancel_token.cancelled() => false,
        };

        let final_status = if completed {
            tracing::info!(
                worker_id = self.worker_id,
                elapsed = ?start.elapsed(),
                "Run finished"
            );
            RunStatus::Finished
        } else {
            tracing::info!(worker_id = self.worker_id, "Run cancelled");
            RunStatus::Failed
        };

        // The terminal status is already decided; a persistence failure here
        // is logged and does not change it.
        if let Err(err) = status_sink.status_changed(self.worker_id, final_status) {
            tracing::error!(
                worker_id = self.worker_id,
                status = %final_status,
                error = %err,
                "Error persisting terminal status"
            );
        }
        self.set_status(final_status);

        match self.metrics.snapshot() {
            Ok(snapshot) => {
                self.log_snapshot(&snapshot);
                if let Err(err) = metrics_sink.metrics_ready(self.worker_id, &snapshot) {
                    tracing::error!(
                        worker_id = self.worker_id,
                        error = %err,
                        "Error persisting metrics snapshot"
                    );
                }
            }
            Err(err) => {
                tracing::error!(
                    worker_id = self.worker_id,
                    error = %err,
                    "Error computing metrics"
                );
            }
        }

        Ok(final_status)
    }

    fn log_snapshot(&self, snapshot: &MetricsSnapshot) {
        tracing::info!(
            worker_id = self.worker_id,
            total_requests = snapshot.total_requests,
            failed_requests = snapshot.failed_requests,
            error_rate = snapshot.error_rate,
            max_latency_s = snapshot.max_latency,
            p50_s = snapshot.percentiles.p50,
            p95_s = snapshot.percentiles.p95,
            p99_s = snapshot.percentiles.p99,
            p999_s = snapshot.percentiles.p999,
            "Run metrics"
        );
    }
}
