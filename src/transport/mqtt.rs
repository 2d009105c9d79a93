//! MQTT transport on top of `rumqttc`
//!
//! Each connection owns a background task that drives the `rumqttc` event
//! loop. The task:
//! - reports the first CONNACK (or the first error) back to `connect`
//! - forwards acknowledgments (outgoing PUBLISH, PUBACK, PUBREC, PUBCOMP,
//!   SUBACK) to the waiting publish/subscribe call
//! - stamps and forwards inbound PUBLISH packets to the delivery sink
//! - keeps polling after connection errors, which is how `rumqttc`
//!   reconnects
//!
//! `rumqttc` does not hand out packet ids, so a publish learns its id from
//! the outgoing PUBLISH event that matches it in request order, and then
//! only accepts the PUBACK or PUBCOMP carrying that id. Late acks for an
//! earlier publish that timed out are skipped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, SubscribeFilter};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, warn};

use super::{ConnectOptions, Connector, Delivery, DeliverySink, TopicFilters, Transport};
use crate::bench::message::{QoS, now_nanos};
use crate::utils::{TransportError, TransportResult};

pub const DEFAULT_PORT: u16 = 1883;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_millis(500);
const DISCONNECT_WAIT: Duration = Duration::from_millis(250);
const REQUEST_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    Sent(u16),
    PubAck(u16),
    PubRec(u16),
    PubComp(u16),
    SubAck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// The n-th publish request of this connection has not gone out yet.
    Outgoing { index: u64, qos: QoS },
    /// Gone out with this packet id, waiting for the final ack.
    Ack(Ack),
}

/// Pairs acknowledgments with the publish request that is being waited on.
#[derive(Debug, Default)]
struct PublishTracker {
    requested: u64,
    sent: u64,
    in_flight: HashSet<u16>,
    pending: Option<Pending>,
}

impl PublishTracker {
    /// Registers a publish request that `rumqttc` accepted.
    fn begin(&mut self, qos: QoS) {
        self.requested += 1;
        self.pending = Some(Pending::Outgoing {
            index: self.requested,
            qos,
        });
    }

    /// Feeds one event in arrival order. Returns true once the publish
    /// registered last is complete.
    fn observe(&mut self, ack: Ack) -> bool {
        match ack {
            Ack::Sent(pkid) => {
                // A packet id still in flight is a retransmission after reconnect.
                if pkid != 0 && !self.in_flight.insert(pkid) {
                    return false;
                }
                self.sent += 1;
                match self.pending {
                    Some(Pending::Outgoing { index, qos }) if index == self.sent => {
                        self.pending = match qos {
                            QoS::AtMostOnce => None,
                            QoS::AtLeastOnce => Some(Pending::Ack(Ack::PubAck(pkid))),
                            QoS::ExactlyOnce => Some(Pending::Ack(Ack::PubComp(pkid))),
                        };
                        self.pending.is_none()
                    }
                    _ => false,
                }
            }
            Ack::PubAck(pkid) | Ack::PubRec(pkid) | Ack::PubComp(pkid) => {
                self.in_flight.remove(&pkid);
                if self.pending == Some(Pending::Ack(ack)) {
                    self.pending = None;
                    return true;
                }
                false
            }
            Ack::SubAck => false,
        }
    }
}

type SharedSink = Arc<Mutex<Option<DeliverySink>>>;

fn to_mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self, options: &ConnectOptions) -> TransportResult<Box<dyn Transport>> {
        let port = options.endpoint.port().unwrap_or(DEFAULT_PORT);
        let mut mqtt = MqttOptions::new(
            options.client_id.clone(),
            options.endpoint.host().to_string(),
            port,
        );
        mqtt.set_clean_session(true);
        mqtt.set_keep_alive(KEEP_ALIVE);
        if let Some(credentials) = &options.credentials {
            mqtt.set_credentials(
                credentials.username.clone(),
                credentials.password.clone(),
            );
        }

        let (client, eventloop) = AsyncClient::new(mqtt, REQUEST_CAPACITY);
        let (acks_tx, acks_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = oneshot::channel();
        let sink: SharedSink = Arc::new(Mutex::new(None));

        let driver = tokio::spawn(drive(
            eventloop,
            options.client_id.clone(),
            acks_tx,
            sink.clone(),
            connected_tx,
        ));

        match timeout(options.connect_timeout, connected_rx).await {
            Ok(Ok(Ok(()))) => Ok(Box::new(MqttTransport {
                client,
                acks: acks_rx,
                tracker: PublishTracker::default(),
                sink,
                driver,
                ack_timeout: options.ack_timeout,
            })),
            Ok(Ok(Err(reason))) => {
                driver.abort();
                Err(TransportError::Connect(reason))
            }
            Ok(Err(_)) => {
                driver.abort();
                Err(TransportError::Closed)
            }
            Err(_) => {
                driver.abort();
                Err(TransportError::ConnectTimeout(options.connect_timeout))
            }
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client_id: String,
    acks: mpsc::UnboundedSender<Ack>,
    sink: SharedSink,
    connected: oneshot::Sender<Result<(), String>>,
) {
    let mut connected = Some(connected);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => match connected.take() {
                Some(tx) => {
                    let _ = tx.send(Ok(()));
                }
                None => info!(client_id = %client_id, "reconnected to the broker"),
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let received_at = now_nanos();
                let sink = sink
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                if let Some(sink) = sink {
                    let _ = sink.send(Delivery {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                        received_at,
                    });
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let _ = acks.send(Ack::PubAck(ack.pkid));
            }
            Ok(Event::Incoming(Packet::PubRec(rec))) => {
                let _ = acks.send(Ack::PubRec(rec.pkid));
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                let _ = acks.send(Ack::PubComp(comp.pkid));
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                let _ = acks.send(Ack::SubAck);
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                let _ = acks.send(Ack::Sent(pkid));
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(client_id = %client_id, "disconnect sent");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                if let Some(tx) = connected.take() {
                    let _ = tx.send(Err(e.to_string()));
                    return;
                }
                warn!(client_id = %client_id, error = %e, "lost connection to the broker, will reconnect");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

pub struct MqttTransport {
    client: AsyncClient,
    acks: mpsc::UnboundedReceiver<Ack>,
    tracker: PublishTracker,
    sink: SharedSink,
    driver: JoinHandle<()>,
    ack_timeout: Duration,
}

impl MqttTransport {
    async fn next_ack(&mut self, deadline: Option<Instant>) -> TransportResult<Ack> {
        let next = match deadline {
            Some(deadline) => timeout_at(deadline, self.acks.recv())
                .await
                .map_err(|_| TransportError::AckTimeout(self.ack_timeout))?,
            None => self.acks.recv().await,
        };
        next.ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&mut self, topic: &str, qos: QoS, payload: Vec<u8>) -> TransportResult<()> {
        self.client
            .publish(topic, to_mqtt_qos(qos), false, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;
        self.tracker.begin(qos);

        let deadline = Instant::now().checked_add(self.ack_timeout);
        loop {
            let ack = self.next_ack(deadline).await?;
            if self.tracker.observe(ack) {
                return Ok(());
            }
        }
    }

    async fn subscribe(
        &mut self,
        filters: &TopicFilters,
        sink: DeliverySink,
    ) -> TransportResult<()> {
        if filters.is_empty() {
            return Err(TransportError::Subscribe("no topic filters".to_string()));
        }
        *self
            .sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);

        let requested = filters
            .iter()
            .map(|(filter, qos)| SubscribeFilter::new(filter.clone(), to_mqtt_qos(*qos)));
        self.client
            .subscribe_many(requested)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let deadline = Instant::now().checked_add(self.ack_timeout);
        loop {
            match self.next_ack(deadline).await? {
                Ack::SubAck => return Ok(()),
                other => {
                    self.tracker.observe(other);
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "disconnect request failed");
        }
        if timeout(DISCONNECT_WAIT, &mut self.driver).await.is_err() {
            self.driver.abort();
        }
        self.sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos0_completes_on_its_own_outgoing_publish() {
        let mut tracker = PublishTracker::default();
        tracker.begin(QoS::AtMostOnce);
        assert!(tracker.observe(Ack::Sent(0)));
    }

    #[test]
    fn test_late_puback_is_not_credited_to_the_next_publish() {
        let mut tracker = PublishTracker::default();

        // First publish goes out as pkid 1 and then times out.
        tracker.begin(QoS::AtLeastOnce);
        assert!(!tracker.observe(Ack::Sent(1)));

        // Second publish is requested before the broker acks the first.
        tracker.begin(QoS::AtLeastOnce);
        assert!(!tracker.observe(Ack::PubAck(1)));
        assert!(!tracker.observe(Ack::Sent(2)));
        assert!(!tracker.observe(Ack::PubAck(3)));
        assert!(tracker.observe(Ack::PubAck(2)));
    }

    #[test]
    fn test_outgoing_publish_of_a_timed_out_request_is_skipped() {
        let mut tracker = PublishTracker::default();

        // First request never left the client before it timed out.
        tracker.begin(QoS::AtLeastOnce);
        tracker.begin(QoS::AtLeastOnce);
        assert!(!tracker.observe(Ack::Sent(1)));
        assert!(!tracker.observe(Ack::PubAck(1)));
        assert!(!tracker.observe(Ack::Sent(2)));
        assert!(tracker.observe(Ack::PubAck(2)));
    }

    #[test]
    fn test_retransmission_after_reconnect_is_not_a_new_publish() {
        let mut tracker = PublishTracker::default();
        tracker.begin(QoS::AtLeastOnce);
        assert!(!tracker.observe(Ack::Sent(1)));

        // Reconnect resends pkid 1 while the second request waits.
        tracker.begin(QoS::AtLeastOnce);
        assert!(!tracker.observe(Ack::Sent(1)));
        assert!(!tracker.observe(Ack::PubAck(1)));
        assert!(!tracker.observe(Ack::Sent(2)));
        assert!(tracker.observe(Ack::PubAck(2)));
    }

    #[test]
    fn test_qos2_waits_for_pubcomp_with_its_own_id() {
        let mut tracker = PublishTracker::default();
        tracker.begin(QoS::ExactlyOnce);
        assert!(!tracker.observe(Ack::Sent(4)));
        assert!(!tracker.observe(Ack::PubRec(4)));
        assert!(!tracker.observe(Ack::PubComp(5)));
        assert!(tracker.observe(Ack::PubComp(4)));
    }

    #[test]
    fn test_suback_does_not_complete_a_publish() {
        let mut tracker = PublishTracker::default();
        tracker.begin(QoS::AtMostOnce);
        assert!(!tracker.observe(Ack::SubAck));
        assert!(tracker.observe(Ack::Sent(0)));
    }
}
