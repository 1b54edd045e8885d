use reqwest::Client;
use std::time::Duration;

/// Builds the shared client for a run. The connection pool is sized to the
/// configured concurrency so pool slots never contend for connections.
pub fn create_client(
    concurrency: u32,
    timeout: Duration,
    connect_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .tcp_nodelay(true)
        .gzip(true)
        .brotli(true)
        .user_agent(format!(
            "pummel/{} (load-generation-engine)",
            env!("CARGO_PKG_VERSION")
        ))
        .pool_max_idle_per_host(concurrency as usize)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
}
