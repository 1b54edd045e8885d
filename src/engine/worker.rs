use crate::http::execute_request;
use crate::metrics::LatencyAggregator;
use crate::token::TokenCache;
use reqwest::{Client, Method};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;

/// One slot of the executor pool. Pulls work tokens from the shared queue
/// until it is drained, issuing one request per token with a bounded random
/// pacing delay in between.
pub struct Worker {
    id: u32,
    client: Client,
    url: String,
    method: Method,
    body: Option<String>,
    token_cache: Option<Arc<TokenCache>>,
    metrics: Arc<LatencyAggregator>,
    task_rx: Arc<Mutex<mpsc::Receiver<u64>>>,
    max_jitter: Duration,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u32,
        client: Client,
        url: String,
        method: Method,
        body: Option<String>,
        token_cache: Option<Arc<TokenCache>>,
        metrics: Arc<LatencyAggregator>,
        task_rx: Arc<Mutex<mpsc::Receiver<u64>>>,
        max_jitter: Duration,
    ) -> Self {
        Self {
            id,
            client,
            url,
            method,
            body,
            token_cache,
            metrics,
            task_rx,
            max_jitter,
        }
    }

    pub async fn run(self) {
        tracing::debug!(worker = self.id, "Pool worker started");

        loop {
            // Hold the queue lock only for the pull, not for the request.
            let task = { self.task_rx.lock().await.recv().await };
            let Some(seq) = task else {
                break;
            };

            tracing::trace!(worker = self.id, seq, "Dispatching request");
            execute_request(
                &self.client,
                &self.url,
                &self.method,
                self.body.as_deref(),
                self.token_cache.as_deref(),
                &self.metrics,
            )
            .await;

            if !self.max_jitter.is_zero() {
                let jitter = rand::random_range(Duration::ZERO..=self.max_jitter);
                sleep(jitter).await;
            }
        }

        tracing::debug!(worker = self.id, "Pool worker stopped");
    }
}
