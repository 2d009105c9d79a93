//! One subscribing client
//!
//! A `SubscriberSession` subscribes to its filter set, tells the coordinator
//! it is ready, then records every delivery until it is told to stop. Forward
//! latency is recovered from the send timestamp embedded in each payload.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::message::decode_timestamp;
use super::results::SubResult;
use super::stats::{LatencyRecorder, ratio};
use crate::transport::{ConnectOptions, Connector, Delivery, TopicFilters};
use crate::utils::{BenchError, BenchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Connecting,
    Subscribed,
    Receiving,
    Draining,
    Done,
}

/// Running tallies of one subscriber.
#[derive(Debug, Clone, Default)]
pub struct ReceiveCounters {
    first_received: Option<i64>,
    last_received: Option<i64>,
    received: u64,
    undecodable: u64,
    latencies: LatencyRecorder,
}

impl ReceiveCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one delivery and, if its payload carries a send timestamp,
    /// records the forward latency in milliseconds.
    pub fn observe(&mut self, delivery: &Delivery) {
        self.received += 1;
        self.first_received.get_or_insert(delivery.received_at);
        self.last_received = Some(delivery.received_at);

        match decode_timestamp(&delivery.payload) {
            Some(sent) => self
                .latencies
                .record(delivery.received_at.saturating_sub(sent) as f64 / 1e6),
            None => self.undecodable += 1,
        }
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn undecodable(&self) -> u64 {
        self.undecodable
    }

    pub fn latencies(&self) -> &LatencyRecorder {
        &self.latencies
    }

    /// Seconds between the first and the last delivery.
    pub fn window_secs(&self) -> f64 {
        match (self.first_received, self.last_received) {
            (Some(first), Some(last)) => last.saturating_sub(first) as f64 / 1e9,
            _ => 0.0,
        }
    }

    pub fn into_result(self, id: impl Into<String>) -> SubResult {
        let summary = self.latencies.summary();
        let duration = self.window_secs();
        SubResult {
            id: id.into(),
            published: 0,
            received: self.received,
            fwd_ratio: 0.0,
            fwd_latency_min: summary.min,
            fwd_latency_max: summary.max,
            fwd_latency_mean: summary.mean,
            fwd_latency_std: summary.std_dev,
            duration,
            avg_msgs_per_sec: ratio(self.received as f64, duration),
            undecodable: self.undecodable,
        }
    }
}

#[derive(Debug)]
pub struct SubscriberSession {
    id: String,
    options: ConnectOptions,
    filters: TopicFilters,
    state: SubscriberState,
}

impl SubscriberSession {
    pub fn new(
        id: impl Into<String>,
        options: ConnectOptions,
        filters: TopicFilters,
    ) -> BenchResult<Self> {
        let id = id.into();
        if filters.is_empty() {
            return Err(BenchError::Workload(format!(
                "subscriber {id} has no topics to subscribe to"
            )));
        }
        Ok(Self {
            id,
            options,
            filters,
            state: SubscriberState::Connecting,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn transition(&mut self, next: SubscriberState) {
        debug!(id = %self.id, from = ?self.state, to = ?next, "subscriber state change");
        self.state = next;
    }

    /// Subscribes, signals `ready`, and receives until `stop` turns true (or
    /// its sender goes away).
    ///
    /// `ready` is dropped without a value when connecting or subscribing
    /// fails, and the error is returned.
    pub async fn run(
        mut self,
        connector: &dyn Connector,
        ready: oneshot::Sender<()>,
        mut stop: watch::Receiver<bool>,
    ) -> BenchResult<SubResult> {
        let mut transport = connector.connect(&self.options).await?;

        let (sink, mut deliveries) = mpsc::unbounded_channel();
        if let Err(e) = transport.subscribe(&self.filters, sink).await {
            transport.disconnect().await;
            return Err(e.into());
        }
        self.transition(SubscriberState::Subscribed);
        info!(
            id = %self.id,
            endpoint = %self.options.endpoint,
            filters = ?self.filters.keys().collect::<Vec<_>>(),
            "subscriber connected"
        );
        if ready.send(()).is_err() {
            debug!(id = %self.id, "coordinator stopped waiting for readiness");
        }

        self.transition(SubscriberState::Receiving);
        let mut counters = ReceiveCounters::new();
        let mut open = true;
        loop {
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        debug!(id = %self.id, "stop signal dropped, finishing");
                        break;
                    }
                    if *stop.borrow_and_update() {
                        break;
                    }
                }
                delivery = deliveries.recv(), if open => match delivery {
                    Some(delivery) => counters.observe(&delivery),
                    None => {
                        warn!(id = %self.id, "delivery channel closed before stop");
                        open = false;
                    }
                },
            }
        }

        self.transition(SubscriberState::Draining);
        while let Ok(delivery) = deliveries.try_recv() {
            counters.observe(&delivery);
        }
        transport.disconnect().await;
        while let Ok(delivery) = deliveries.try_recv() {
            counters.observe(&delivery);
        }

        self.transition(SubscriberState::Done);
        if counters.undecodable() > 0 {
            warn!(
                id = %self.id,
                undecodable = counters.undecodable(),
                "received payloads without a send timestamp"
            );
        }
        info!(id = %self.id, received = counters.received(), "subscriber done");
        Ok(counters.into_result(self.id))
    }
}
