//! In-process loopback broker
//!
//! `MemoryBroker` routes publishes straight into the delivery sinks of the
//! connected subscribers whose filters match, using MQTT wildcard rules. It
//! never loses a message, which makes it a reference point for the engine's
//! own overhead and the backbone of the end-to-end tests.
//!
//! Faults can be injected: connects from specific client ids can be refused,
//! and publishes can be rejected wholesale.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ConnectOptions, Connector, Delivery, DeliverySink, TopicFilters, Transport};
use crate::bench::message::{QoS, now_nanos};
use crate::utils::{TransportError, TransportResult};

#[derive(Debug)]
struct Subscription {
    filters: Vec<String>,
    sink: DeliverySink,
}

#[derive(Debug, Default)]
struct BrokerState {
    subscriptions: HashMap<String, Subscription>,
    rejected_clients: HashSet<String>,
    reject_publishes: bool,
    published: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Refuse connections from `client_id`.
    pub fn reject_client(&self, client_id: impl Into<String>) {
        self.lock().rejected_clients.insert(client_id.into());
    }

    /// Fail every publish while set.
    pub fn set_reject_publishes(&self, reject: bool) {
        self.lock().reject_publishes = reject;
    }

    /// Number of publishes accepted so far.
    pub fn published(&self) -> u64 {
        self.lock().published
    }

    /// Number of clients currently holding a subscription.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscriptions.len()
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, options: &ConnectOptions) -> TransportResult<Box<dyn Transport>> {
        if self.lock().rejected_clients.contains(&options.client_id) {
            return Err(TransportError::Connect(format!(
                "client {} rejected by broker",
                options.client_id
            )));
        }
        Ok(Box::new(MemoryTransport {
            client_id: options.client_id.clone(),
            broker: self.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    client_id: String,
    broker: MemoryBroker,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&mut self, topic: &str, _qos: QoS, payload: Vec<u8>) -> TransportResult<()> {
        let mut state = self.broker.lock();
        if state.reject_publishes {
            return Err(TransportError::Publish(format!(
                "publish to {topic} rejected by broker"
            )));
        }
        state.published += 1;

        let received_at = now_nanos();
        for subscription in state.subscriptions.values() {
            if subscription
                .filters
                .iter()
                .any(|filter| topic_matches(topic, filter))
            {
                // A subscriber that went away simply misses the message.
                let _ = subscription.sink.send(Delivery {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                    received_at,
                });
            }
        }
        Ok(())
    }

    async fn subscribe(
        &mut self,
        filters: &TopicFilters,
        sink: DeliverySink,
    ) -> TransportResult<()> {
        if filters.is_empty() {
            return Err(TransportError::Subscribe("no topic filters".to_string()));
        }
        self.broker.lock().subscriptions.insert(
            self.client_id.clone(),
            Subscription {
                filters: filters.keys().cloned().collect(),
                sink,
            },
        );
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.broker.lock().subscriptions.remove(&self.client_id);
    }
}

/// Checks if a topic name matches a topic filter
///
/// - '+' matches exactly one topic level
/// - '#' matches any number of levels including the parent level
/// - topics starting with '$' do not match root-level wildcards
pub fn topic_matches(topic: &str, filter: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('#') || filter.starts_with('+')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    let mut filter_levels = filter.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
