//! The `report` module renders the outcome of a run.
//!
//! - `text`: one block per publisher and subscriber, fleet totals, the
//!   session failures and a footer with the nominal benchmark time
//! - `json`: a single pretty-printed object with the keys `publish runs`,
//!   `subscribe runs`, `publish totals` and `receive totals`

use std::fmt::Write as _;
use std::str::FromStr;

use crate::bench::{Aggregate, Distribution, PubResult, SessionFailure, SubResult};
use crate::utils::{BenchError, BenchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(BenchError::UnknownFormat(other.to_string())),
        }
    }
}

/// Run facts the text report prints next to the results.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub distribution: Distribution,
    pub rate: f64,
    pub message_count: u64,
}

impl RunSummary {
    /// `round(count / rate)` seconds, the time the run was meant to take.
    pub fn nominal_secs(&self) -> f64 {
        if self.rate > 0.0 {
            (self.message_count as f64 / self.rate).round()
        } else {
            0.0
        }
    }
}

pub fn render(
    format: ReportFormat,
    aggregate: &Aggregate,
    failures: &[SessionFailure],
    summary: &RunSummary,
) -> BenchResult<String> {
    match format {
        ReportFormat::Text => Ok(render_text(aggregate, failures, summary)),
        ReportFormat::Json => render_json(aggregate),
    }
}

pub fn render_json(aggregate: &Aggregate) -> BenchResult<String> {
    serde_json::to_string_pretty(aggregate).map_err(|e| BenchError::Report(e.to_string()))
}

fn publisher_block(out: &mut String, run: &PubResult) {
    let _ = writeln!(out, "=================== PUBLISHER {} ===================", run.id);
    let _ = writeln!(
        out,
        "Publish Success Ratio:   {:.2}% ({}/{})",
        percent(run.successes, run.successes + run.failures),
        run.successes,
        run.successes + run.failures
    );
    let _ = writeln!(out, "Runtime (sec):           {:.2}", run.run_time);
    let _ = writeln!(out, "Pub time min (ms):       {:.2}", run.pub_time_min);
    let _ = writeln!(out, "Pub time max (ms):       {:.2}", run.pub_time_max);
    let _ = writeln!(out, "Pub time mean (ms):      {:.2}", run.pub_time_mean);
    let _ = writeln!(out, "Pub time std (ms):       {:.2}", run.pub_time_std);
    let _ = writeln!(out, "Bandwidth (msg/sec):     {:.2}", run.pubs_per_sec);
    out.push('\n');
}

fn subscriber_block(out: &mut String, run: &SubResult) {
    let _ = writeln!(out, "=================== SUBSCRIBER {} ===================", run.id);
    let _ = writeln!(
        out,
        "Forward Success Ratio:       {:.2}% ({}/{})",
        run.fwd_ratio * 100.0,
        run.received,
        run.published
    );
    let _ = writeln!(out, "Forward latency min (ms):    {:.2}", run.fwd_latency_min);
    let _ = writeln!(out, "Forward latency max (ms):    {:.2}", run.fwd_latency_max);
    let _ = writeln!(out, "Forward latency mean (ms):   {:.2}", run.fwd_latency_mean);
    let _ = writeln!(out, "Forward latency std (ms):    {:.2}", run.fwd_latency_std);
    let _ = writeln!(out, "Receive window (sec):        {:.2}", run.duration);
    let _ = writeln!(out, "Receiving rate (msg/sec):    {:.2}", run.avg_msgs_per_sec);
    if run.undecodable > 0 {
        let _ = writeln!(out, "Undecodable payloads:        {}", run.undecodable);
    }
    out.push('\n');
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn render_text(
    aggregate: &Aggregate,
    failures: &[SessionFailure],
    summary: &RunSummary,
) -> String {
    let mut out = String::new();
    let pub_totals = &aggregate.pub_totals;
    let sub_totals = &aggregate.sub_totals;

    out.push('\n');
    let _ = writeln!(
        out,
        "Published using a {} distribution at {} msg/sec",
        summary.distribution, summary.rate
    );
    out.push('\n');

    for run in &aggregate.publishers {
        publisher_block(&mut out, run);
    }
    for run in &aggregate.subscribers {
        subscriber_block(&mut out, run);
    }

    let _ = writeln!(
        out,
        "================= TOTAL PUBLISHER ({}) =================",
        aggregate.publishers.len()
    );
    let _ = writeln!(
        out,
        "Total Publish Success Ratio:   {:.2}% ({}/{})",
        pub_totals.pub_ratio * 100.0,
        pub_totals.successes,
        pub_totals.successes + pub_totals.failures
    );
    let _ = writeln!(out, "Total Runtime (sec):           {:.2}", pub_totals.total_run_time);
    let _ = writeln!(out, "Average Runtime (sec):         {:.2}", pub_totals.avg_run_time);
    let _ = writeln!(out, "Pub time min (ms):             {:.2}", pub_totals.pub_time_min);
    let _ = writeln!(out, "Pub time max (ms):             {:.2}", pub_totals.pub_time_max);
    let _ = writeln!(out, "Pub time mean mean (ms):       {:.2}", pub_totals.pub_time_mean_avg);
    let _ = writeln!(out, "Pub time mean std (ms):        {:.2}", pub_totals.pub_time_mean_std);
    let _ = writeln!(out, "Average Bandwidth (msg/sec):   {:.2}", pub_totals.avg_msgs_per_sec);
    let _ = writeln!(out, "Total Bandwidth (msg/sec):     {:.2}", pub_totals.total_msgs_per_sec);
    out.push('\n');

    let _ = writeln!(
        out,
        "================= TOTAL SUBSCRIBER ({}) =================",
        aggregate.subscribers.len()
    );
    let _ = writeln!(
        out,
        "Total Forward Success Ratio:      {:.2}% ({}/{})",
        sub_totals.total_fwd_ratio * 100.0,
        sub_totals.total_received,
        sub_totals.total_published
    );
    let _ = writeln!(out, "Forward latency min (ms):         {:.2}", sub_totals.fwd_latency_min);
    let _ = writeln!(out, "Forward latency max (ms):         {:.2}", sub_totals.fwd_latency_max);
    let _ = writeln!(out, "Forward latency mean std (ms):    {:.2}", sub_totals.fwd_latency_mean_std);
    let _ = writeln!(out, "Total Mean forward latency (ms):  {:.2}", sub_totals.fwd_latency_mean_avg);
    out.push('\n');
    let _ = writeln!(out, "Total Receiving rate (msg/sec): {:.2}", sub_totals.total_msgs_per_sec);

    if !failures.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "================= FAILED SESSIONS ({}) =================", failures.len());
        for failure in failures {
            let _ = writeln!(out, "{failure}");
        }
    }

    out.push('\n');
    let _ = writeln!(
        out,
        "All jobs done. Time spent for the benchmark: {}s",
        summary.nominal_secs()
    );
    let _ = writeln!(out, "======================================================");
    out
}

#[cfg(test)]
mod tests;
