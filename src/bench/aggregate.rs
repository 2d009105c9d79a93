//! Fleet-level reduction of per-session results
//!
//! Everything here is a pure function of its inputs: running it twice on the
//! same results gives the same totals.
//!
//! Pooled means and standard deviations are computed over the per-session
//! means (mean of means, sample stdev of means), not over the raw samples.
//! Sessions without any timing sample (no successful publish, no decodable
//! delivery) are left out of min/max/mean pooling so their `0.0` sentinels
//! don't drag the fleet figures down.

use std::time::Duration;

use super::results::{Aggregate, PubResult, PubTotals, SubResult, SubTotals};
use super::stats::{mean, ratio, sample_std_dev};

pub fn publisher_totals(results: &[PubResult], total_time: Duration) -> PubTotals {
    let successes: u64 = results.iter().map(|r| r.successes).sum();
    let failures: u64 = results.iter().map(|r| r.failures).sum();

    let timed: Vec<&PubResult> = results.iter().filter(|r| r.successes > 0).collect();
    let means: Vec<f64> = timed.iter().map(|r| r.pub_time_mean).collect();
    let rates: Vec<f64> = results.iter().map(|r| r.pubs_per_sec).collect();
    let run_times: Vec<f64> = results.iter().map(|r| r.run_time).collect();

    PubTotals {
        pub_ratio: ratio(successes as f64, (successes + failures) as f64),
        successes,
        failures,
        total_run_time: total_time.as_secs_f64(),
        avg_run_time: mean(&run_times),
        pub_time_min: timed
            .iter()
            .map(|r| r.pub_time_min)
            .reduce(f64::min)
            .unwrap_or(0.0),
        pub_time_max: timed
            .iter()
            .map(|r| r.pub_time_max)
            .reduce(f64::max)
            .unwrap_or(0.0),
        pub_time_mean_avg: mean(&means),
        pub_time_mean_std: sample_std_dev(&means),
        total_msgs_per_sec: rates.iter().sum(),
        avg_msgs_per_sec: mean(&rates),
    }
}

/// Copies the subscriber results with `published` and `fwd_ratio` filled in
/// from the publisher that shares their identity. A subscriber without a
/// matching publisher keeps `published = 0` and `fwd_ratio = 0.0`.
pub fn match_subscribers(subscribers: &[SubResult], publishers: &[PubResult]) -> Vec<SubResult> {
    subscribers
        .iter()
        .map(|sub| {
            let mut matched = sub.clone();
            matched.published = publishers
                .iter()
                .find(|p| p.id == sub.id)
                .map(|p| p.successes)
                .unwrap_or(0);
            matched.fwd_ratio = ratio(matched.received as f64, matched.published as f64);
            matched
        })
        .collect()
}

/// Totals over subscriber results that have already been matched.
pub fn subscriber_totals(matched: &[SubResult]) -> SubTotals {
    let total_received: u64 = matched.iter().map(|r| r.received).sum();
    let total_published: u64 = matched.iter().map(|r| r.published).sum();

    let timed: Vec<&SubResult> = matched.iter().filter(|r| r.latency_samples() > 0).collect();
    let means: Vec<f64> = timed.iter().map(|r| r.fwd_latency_mean).collect();

    SubTotals {
        total_fwd_ratio: ratio(total_received as f64, total_published as f64),
        total_received,
        total_published,
        fwd_latency_min: timed
            .iter()
            .map(|r| r.fwd_latency_min)
            .reduce(f64::min)
            .unwrap_or(0.0),
        fwd_latency_max: timed
            .iter()
            .map(|r| r.fwd_latency_max)
            .reduce(f64::max)
            .unwrap_or(0.0),
        fwd_latency_mean_avg: mean(&means),
        fwd_latency_mean_std: sample_std_dev(&means),
        total_msgs_per_sec: matched.iter().map(|r| r.avg_msgs_per_sec).sum(),
    }
}

pub fn aggregate(
    publishers: &[PubResult],
    subscribers: &[SubResult],
    total_time: Duration,
) -> Aggregate {
    let matched = match_subscribers(subscribers, publishers);
    Aggregate {
        publishers: publishers.to_vec(),
        pub_totals: publisher_totals(publishers, total_time),
        sub_totals: subscriber_totals(&matched),
        subscribers: matched,
    }
}
