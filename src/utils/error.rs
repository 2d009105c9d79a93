//! The `error` module defines the error types used within `popbench`.
//!
//! `BenchError` covers everything that aborts a run before or around the
//! sessions (configuration, workload files, node lookup). `TransportError` is
//! what a transport collaborator reports for a single connect, publish or
//! subscribe call; sessions decide whether that is fatal for them.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),
    #[error("unknown distribution '{0}' (expected 'poisson' or 'lognormal')")]
    UnknownDistribution(String),
    #[error("unknown report format '{0}' (expected 'text' or 'json')")]
    UnknownFormat(String),
    #[error("unknown transport '{0}' (expected 'mqtt', 'websocket' or 'memory')")]
    UnknownTransport(String),
    #[error("publish rate must be a positive number of messages per second, got {0}")]
    InvalidRate(f64),
    #[error("coefficient of variation must be a non-negative number, got {0}")]
    InvalidVariation(f64),
    #[error("invalid QoS level {0} (expected 0, 1 or 2)")]
    InvalidQos(u8),
    #[error("invalid client count {0}: at least one publisher/subscriber pair is required")]
    InvalidClientCount(usize),
    #[error("failed to read workload file {path}: {source}")]
    WorkloadRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed workload file: {0}")]
    WorkloadParse(#[from] serde_json::Error),
    #[error("invalid workload: {0}")]
    Workload(String),
    #[error("no endpoint configured for node {0}")]
    UnknownNode(String),
    #[error("failed to render report: {0}")]
    Report(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type BenchResult<T> = Result<T, BenchError>;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("no connection acknowledgment within {0:?}")]
    ConnectTimeout(Duration),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("no publish acknowledgment within {0:?}")]
    AckTimeout(Duration),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("connection closed")]
    Closed,
}

pub type TransportResult<T> = Result<T, TransportError>;
