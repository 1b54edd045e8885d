use crate::metrics::LatencyAggregator;
use crate::token::TokenCache;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use std::time::Instant;

/// Transport-level failure classification, used for log context only.
/// Application-level error statuses (4xx/5xx) are responses, not failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    Token,
    Other,
}

impl FailureKind {
    pub fn from_reqwest_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connect
        } else {
            FailureKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connect => "connect",
            FailureKind::Token => "token",
            FailureKind::Other => "other",
        }
    }
}

/// Issues exactly one HTTP call and reports its outcome to the aggregator.
///
/// Every invocation increments the total-request count exactly once:
/// - a received response (any status) records its latency, measured from
///   dispatch to response headers;
/// - a transport error or a token-acquisition failure records a failure
///   without a latency sample.
pub async fn execute_request(
    client: &Client,
    url: &str,
    method: &Method,
    body: Option<&str>,
    token_cache: Option<&TokenCache>,
    metrics: &LatencyAggregator,
) {
    let mut request = client.request(method.clone(), url);

    if let Some(cache) = token_cache {
        match cache.get_token().await {
            Ok(token) => {
                request = request.bearer_auth(token);
            }
            Err(err) => {
                tracing::error!(url, error = %err, kind = FailureKind::Token.as_str(), "Failed to obtain bearer token");
                metrics.record_failure();
                return;
            }
        }
    }

    if method == Method::POST {
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }
    }

    let start = Instant::now();
    match request.send().await {
        Ok(response) => {
            let latency = start.elapsed();
            let status = response.status().as_u16();
            metrics.record_latency(latency);
            tracing::debug!(url, status, latency_us = latency.as_micros() as u64, "Request completed");

            // Consume the body to allow connection reuse.
            let _ = response.bytes().await;
        }
        Err(err) => {
            let kind = FailureKind::from_reqwest_error(&err);
            tracing::error!(url, method = %method, error = %err, kind = kind.as_str(), "Request failed");
            metrics.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> Client {
        crate::http::create_client(1, Duration::from_secs(2), Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn response_records_latency_and_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let metrics = LatencyAggregator::new();
        let url = format!("{}/ping", server.uri());
        execute_request(&test_client(), &url, &Method::GET, None, None, &metrics).await;

        assert_eq!(metrics.total_requests(), 1);
        assert_eq!(metrics.failed_requests(), 0);
        assert_eq!(metrics.sample_count(), 1);
    }

    #[tokio::test]
    async fn error_status_is_a_response_not_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let metrics = LatencyAggregator::new();
        execute_request(&test_client(), &server.uri(), &Method::GET, None, None, &metrics).await;

        assert_eq!(metrics.total_requests(), 1);
        assert_eq!(metrics.failed_requests(), 0);
        assert_eq!(metrics.sample_count(), 1);
    }

    #[tokio::test]
    async fn transport_error_counts_one_failure() {
        // Nothing listens on this port.
        let metrics = LatencyAggregator::new();
        execute_request(
            &test_client(),
            "http://127.0.0.1:1/unreachable",
            &Method::GET,
            None,
            None,
            &metrics,
        )
        .await;

        assert_eq!(metrics.total_requests(), 1);
        assert_eq!(metrics.failed_requests(), 1);
        assert_eq!(metrics.sample_count(), 0);
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"name":"load"}"#))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let metrics = LatencyAggregator::new();
        let url = format!("{}/items", server.uri());
        execute_request(
            &test_client(),
            &url,
            &Method::POST,
            Some(r#"{"name":"load"}"#),
            None,
            &metrics,
        )
        .await;

        assert_eq!(metrics.total_requests(), 1);
        assert_eq!(metrics.failed_requests(), 0);
    }

    #[tokio::test]
    async fn token_failure_counts_one_failure_without_sending() {
        use crate::types::Credentials;

        let target = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&target)
            .await;

        let token_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&token_server)
            .await;

        let client = test_client();
        let cache = TokenCache::new(
            Credentials::Basic {
                username: "svc".into(),
                password: "secret".into(),
            },
            format!("{}/token", token_server.uri()),
            client.clone(),
        );

        let metrics = LatencyAggregator::new();
        execute_request(&client, &target.uri(), &Method::GET, None, Some(&cache), &metrics).await;

        assert_eq!(metrics.total_requests(), 1);
        assert_eq!(metrics.failed_requests(), 1);
    }
}
