//! The `transport` module is the boundary between the benchmark engine and
//! the broker.
//!
//! The engine only sees the `Connector` and `Transport` traits: connect,
//! publish-and-wait-for-acknowledgment, subscribe with a delivery sink, and
//! disconnect. Three implementations are provided:
//!
//! - `mqtt`: MQTT 3.1.1 through `rumqttc`
//! - `websocket`: the JSON-over-WebSocket protocol spoken by popsub brokers
//! - `memory`: an in-process loopback broker for dry runs and tests
//!
//! Reconnection after a lost connection is the transport's business; the
//! engine never retries a connect itself.

pub mod memory;
pub mod message;
pub mod mqtt;
pub mod websocket;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::bench::message::QoS;
use crate::utils::{BenchError, TransportError, TransportResult};

pub use memory::MemoryBroker;
pub use mqtt::MqttConnector;
pub use websocket::WsConnector;

/// Topic filter → requested QoS.
pub type TopicFilters = BTreeMap<String, QoS>;

/// Channel end a transport pushes inbound messages into.
pub type DeliverySink = UnboundedSender<Delivery>;

/// An inbound message, stamped by the transport when it arrived.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Wall-clock receive time, nanoseconds since the UNIX epoch.
    pub received_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Credentials are only used when both parts are present and non-empty.
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some(Self {
                username: u.to_string(),
                password: p.to_string(),
            }),
            _ => None,
        }
    }
}

/// A broker address such as `tcp://10.0.0.5:1883` or `ws://localhost:8080`.
///
/// A bare `host[:port]` is read as `tcp://host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    pub fn parse(raw: &str) -> TransportResult<Self> {
        let raw = raw.trim();
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("tcp://{raw}")
        };
        let url = Url::parse(&candidate)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{raw}: {e}")))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(TransportError::InvalidEndpoint(raw.to_string()));
        }
        Ok(Self { url })
    }

    /// Fills in `port` when the address did not name one.
    pub fn with_default_port(mut self, port: u16) -> Self {
        if self.url.port().is_none() {
            // Only fails for URLs without a host, which `parse` rejects.
            let _ = self.url.set_port(Some(port));
        }
        self
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn port(&self) -> Option<u16> {
        self.url.port_or_known_default()
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Everything a transport needs to open one session's connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub endpoint: Endpoint,
    pub credentials: Option<Credentials>,
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> TransportResult<Box<dyn Transport>>;
}

#[async_trait]
pub trait Transport: Send {
    /// Publishes one message and waits until the broker acknowledged it
    /// (QoS 0: written to the connection).
    async fn publish(&mut self, topic: &str, qos: QoS, payload: Vec<u8>) -> TransportResult<()>;

    /// Subscribes to every filter; matching messages are pushed into `sink`
    /// until the transport is disconnected.
    async fn subscribe(&mut self, filters: &TopicFilters, sink: DeliverySink)
    -> TransportResult<()>;

    async fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Mqtt,
    Websocket,
    Memory,
}

impl FromStr for TransportKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mqtt" => Ok(TransportKind::Mqtt),
            "websocket" | "ws" => Ok(TransportKind::Websocket),
            "memory" => Ok(TransportKind::Memory),
            other => Err(BenchError::UnknownTransport(other.to_string())),
        }
    }
}

/// Builds the connector shared by every session of a run.
pub fn connector(kind: TransportKind) -> Arc<dyn Connector> {
    match kind {
        TransportKind::Mqtt => Arc::new(MqttConnector),
        TransportKind::Websocket => Arc::new(WsConnector),
        TransportKind::Memory => Arc::new(MemoryBroker::new()),
    }
}

#[cfg(test)]
mod tests;
