//! HTTP load-generation and measurement engine.
//!
//! A [`Runner`] drives a fixed-size pool of executor tasks against one
//! [`Environment`], counts every attempt in a [`LatencyAggregator`], and
//! reports lifecycle transitions and a final [`MetricsSnapshot`] through the
//! [`StatusSink`] / [`MetricsSink`] capabilities supplied by the caller.
//! Targets behind authentication get a shared [`TokenCache`] that refreshes
//! bearer tokens on expiry without duplicating in-flight refreshes.
//!
//! Persistence, routing and configuration loading are the caller's concern;
//! this crate only needs an environment snapshot, a validated [`RunConfig`]
//! and the two sinks.

mod engine;
pub mod error;
mod http;
mod metrics;
mod sink;
mod token;
mod types;

pub use engine::Runner;
pub use reqwest::Method;
pub use error::{ComputeError, Error, SinkError, TokenError};
pub use metrics::{LatencyAggregator, MetricsSnapshot, Percentiles, SNAPSHOT_RANKS};
pub use sink::{MetricsSink, StatusSink};
pub use token::TokenCache;
pub use types::{Credentials, Environment, RunConfig, RunStatus};
