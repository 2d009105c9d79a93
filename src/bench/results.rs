//! Per-session results and fleet totals
//!
//! Field names on the wire (JSON report) keep the historical names used by
//! downstream tooling, hence the `serde(rename)` attributes.

use serde::{Deserialize, Serialize};

use super::stats::{LatencyRecorder, ratio};

/// Snapshot of one publisher session, produced once when it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubResult {
    pub id: String,
    #[serde(rename = "pub_successes")]
    pub successes: u64,
    pub failures: u64,
    /// Seconds.
    pub run_time: f64,
    /// Round-trip times of successful publishes, milliseconds.
    pub pub_time_min: f64,
    pub pub_time_max: f64,
    pub pub_time_mean: f64,
    pub pub_time_std: f64,
    #[serde(rename = "publish_per_sec")]
    pub pubs_per_sec: f64,
}

impl PubResult {
    /// `times` holds one round-trip sample per successful publish.
    pub fn new(id: impl Into<String>, failures: u64, times: &LatencyRecorder, run_time: f64) -> Self {
        let summary = times.summary();
        let successes = summary.count as u64;
        Self {
            id: id.into(),
            successes,
            failures,
            run_time,
            pub_time_min: summary.min,
            pub_time_max: summary.max,
            pub_time_mean: summary.mean,
            pub_time_std: summary.std_dev,
            pubs_per_sec: ratio(successes as f64, run_time),
        }
    }
}

/// Snapshot of one subscriber session.
///
/// `published` and `fwd_ratio` stay zero until the aggregator matches the
/// subscriber with its publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResult {
    pub id: String,
    #[serde(rename = "actual_published")]
    pub published: u64,
    pub received: u64,
    #[serde(rename = "fwd_success_ratio")]
    pub fwd_ratio: f64,
    /// Forward latency, milliseconds.
    #[serde(rename = "fwd_time_min")]
    pub fwd_latency_min: f64,
    #[serde(rename = "fwd_time_max")]
    pub fwd_latency_max: f64,
    #[serde(rename = "fwd_time_mean")]
    pub fwd_latency_mean: f64,
    #[serde(rename = "fwd_time_std")]
    pub fwd_latency_std: f64,
    /// Seconds between the first and the last received message.
    pub duration: f64,
    pub avg_msgs_per_sec: f64,
    /// Messages without a decodable send timestamp.
    pub undecodable: u64,
}

impl SubResult {
    /// Number of messages that contributed a latency sample.
    pub fn latency_samples(&self) -> u64 {
        self.received.saturating_sub(self.undecodable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PubTotals {
    #[serde(rename = "publish_success_ratio")]
    pub pub_ratio: f64,
    pub successes: u64,
    pub failures: u64,
    pub total_run_time: f64,
    pub avg_run_time: f64,
    pub pub_time_min: f64,
    pub pub_time_max: f64,
    pub pub_time_mean_avg: f64,
    pub pub_time_mean_std: f64,
    pub total_msgs_per_sec: f64,
    pub avg_msgs_per_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubTotals {
    #[serde(rename = "fwd_success_ratio")]
    pub total_fwd_ratio: f64,
    #[serde(rename = "successes")]
    pub total_received: u64,
    #[serde(rename = "actual_total_published")]
    pub total_published: u64,
    pub fwd_latency_min: f64,
    pub fwd_latency_max: f64,
    pub fwd_latency_mean_avg: f64,
    pub fwd_latency_mean_std: f64,
    #[serde(rename = "avg_msgs_per_sec")]
    pub total_msgs_per_sec: f64,
}

/// Everything the report renders: per-session results (subscribers already
/// cross-matched) and both fleet totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    #[serde(rename = "publish runs")]
    pub publishers: Vec<PubResult>,
    #[serde(rename = "subscribe runs")]
    pub subscribers: Vec<SubResult>,
    #[serde(rename = "publish totals")]
    pub pub_totals: PubTotals,
    #[serde(rename = "receive totals")]
    pub sub_totals: SubTotals,
}
