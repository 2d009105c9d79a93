//! Benchmark messages and the in-band timestamp format
//!
//! Every payload starts with the send time in nanoseconds since the UNIX
//! epoch, written as ASCII decimal, followed by the delimiter `#@#` and zero
//! padding. A subscriber recovers the send time by scanning for the delimiter,
//! so no side channel between publisher and subscriber is needed.
//!
//! Notes on fields:
//! - `topic`: topic name used for routing
//! - `qos`: delivery mode requested from the transport
//! - `payload`: encoded timestamp + padding
//! - `sent` / `delivered`: wall-clock nanoseconds around the publish call
//! - `error`: set when the transport reported a failure

use serde::{Deserialize, Serialize};

use crate::utils::BenchError;

/// Separator between the embedded send timestamp and the padding.
pub const DELIMITER: &[u8; 3] = b"#@#";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "u8", try_from = "u8")]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = BenchError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(BenchError::InvalidQos(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub qos: QoS,
    pub payload: Vec<u8>,
    pub sent: i64,
    pub delivered: Option<i64>,
    pub error: bool,
}

impl Message {
    /// Builds a message stamped with `sent` (nanoseconds) whose payload is
    /// padded to `size` bytes.
    pub fn new(topic: impl Into<String>, qos: QoS, sent: i64, size: usize) -> Self {
        Self {
            topic: topic.into(),
            qos,
            payload: encode_payload(sent, size),
            sent,
            delivered: None,
            error: false,
        }
    }

    /// Round-trip time in milliseconds, if the publish succeeded.
    pub fn round_trip_ms(&self) -> Option<f64> {
        self.delivered
            .filter(|_| !self.error)
            .map(|delivered| (delivered - self.sent) as f64 / 1e6)
    }
}

/// Wall-clock time in nanoseconds since the UNIX epoch.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Encodes `sent_nanos` followed by the delimiter and zero padding.
///
/// The payload is `size` bytes long unless the header alone is longer, in
/// which case it is exactly the header.
pub fn encode_payload(sent_nanos: i64, size: usize) -> Vec<u8> {
    let stamp = sent_nanos.to_string();
    let header = stamp.len() + DELIMITER.len();
    let mut payload = Vec::with_capacity(size.max(header));
    payload.extend_from_slice(stamp.as_bytes());
    payload.extend_from_slice(DELIMITER);
    payload.resize(size.max(header), 0);
    payload
}

/// Recovers the send timestamp from a payload.
///
/// Returns `None` when the delimiter is missing or the prefix is not a
/// decimal integer.
pub fn decode_timestamp(payload: &[u8]) -> Option<i64> {
    let pos = payload
        .windows(DELIMITER.len())
        .position(|window| window == DELIMITER)?;
    std::str::from_utf8(&payload[..pos]).ok()?.parse().ok()
}
