//! One publishing client
//!
//! A `PublisherSession` owns a single transport connection and publishes a
//! bounded stream of timestamped messages, pacing them with its own
//! `RateGenerator`. The session moves through
//! `Connecting -> Ready -> Draining -> Done`; while `Ready` it loops over
//! generate, send and wait.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::message::{Message, QoS, now_nanos};
use super::rate::RateGenerator;
use super::results::PubResult;
use super::stats::LatencyRecorder;
use crate::transport::{ConnectOptions, Connector};
use crate::utils::{BenchError, BenchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Connecting,
    Ready,
    Draining,
    Done,
}

#[derive(Debug)]
pub struct PublisherSession {
    id: String,
    options: ConnectOptions,
    topics: Vec<String>,
    message_size: usize,
    message_count: u64,
    qos: QoS,
    rate: RateGenerator,
    state: PublisherState,
}

impl PublisherSession {
    pub fn new(
        id: impl Into<String>,
        options: ConnectOptions,
        topics: Vec<String>,
        message_size: usize,
        message_count: u64,
        qos: QoS,
        rate: RateGenerator,
    ) -> BenchResult<Self> {
        let id = id.into();
        if topics.is_empty() && message_count > 0 {
            return Err(BenchError::Workload(format!(
                "publisher {id} has no topics to publish on"
            )));
        }
        Ok(Self {
            id,
            options,
            topics,
            message_size,
            message_count,
            qos,
            rate,
            state: PublisherState::Connecting,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn transition(&mut self, next: PublisherState) {
        debug!(id = %self.id, from = ?self.state, to = ?next, "publisher state change");
        self.state = next;
    }

    /// Publishes every message and reports the session's result.
    ///
    /// Connect errors end the session. Individual publish errors are counted
    /// as failures and the loop carries on.
    pub async fn run(mut self, connector: &dyn Connector) -> BenchResult<PubResult> {
        let started = Instant::now();

        if self.message_count == 0 {
            self.transition(PublisherState::Done);
            let run_time = started.elapsed().as_secs_f64();
            return Ok(PubResult::new(self.id, 0, &LatencyRecorder::new(), run_time));
        }

        let mut transport = connector.connect(&self.options).await?;
        self.transition(PublisherState::Ready);
        info!(
            id = %self.id,
            endpoint = %self.options.endpoint,
            topics = ?self.topics,
            rate = self.rate.rate(),
            distribution = self.rate.distribution().name(),
            "publisher connected"
        );

        let mut times = LatencyRecorder::new();
        let mut failures = 0u64;
        let mut last_sent = i64::MIN;

        for n in 0..self.message_count {
            let topic = &self.topics[(n % self.topics.len() as u64) as usize];
            let sent = now_nanos().max(last_sent.saturating_add(1));
            last_sent = sent;
            let mut message = Message::new(topic.as_str(), self.qos, sent, self.message_size);

            let attempt = Instant::now();
            let payload = std::mem::take(&mut message.payload);
            match transport.publish(&message.topic, message.qos, payload).await {
                Ok(()) => {
                    let flight = i64::try_from(attempt.elapsed().as_nanos()).unwrap_or(i64::MAX);
                    message.delivered = Some(sent.saturating_add(flight));
                }
                Err(e) => {
                    message.error = true;
                    failures += 1;
                    warn!(id = %self.id, topic = %message.topic, error = %e, "error publishing message");
                }
            }
            let elapsed = attempt.elapsed();

            if let Some(millis) = message.round_trip_ms() {
                times.record(millis);
            }

            if n + 1 < self.message_count {
                let wait = self.rate.next_delay(elapsed);
                if wait > Duration::ZERO {
                    sleep(wait).await;
                }
            }
        }

        self.transition(PublisherState::Draining);
        transport.disconnect().await;

        let run_time = started.elapsed().as_secs_f64();
        self.transition(PublisherState::Done);
        info!(
            id = %self.id,
            successes = times.len(),
            failures,
            "publisher done"
        );
        Ok(PubResult::new(self.id, failures, &times, run_time))
    }
}
