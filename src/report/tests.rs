use std::time::Duration;

use super::{ReportFormat, RunSummary, render, render_json, render_text};
use crate::bench::{
    Distribution, FailureKind, PubResult, Role, SessionFailure, SubResult, aggregate,
};
use crate::utils::BenchError;

fn sample() -> crate::bench::Aggregate {
    let publishers = vec![PubResult {
        id: "1".to_string(),
        successes: 50,
        failures: 0,
        run_time: 5.0,
        pub_time_min: 0.5,
        pub_time_max: 2.0,
        pub_time_mean: 1.0,
        pub_time_std: 0.25,
        pubs_per_sec: 10.0,
    }];
    let subscribers = vec![SubResult {
        id: "1".to_string(),
        published: 0,
        received: 45,
        fwd_ratio: 0.0,
        fwd_latency_min: 1.0,
        fwd_latency_max: 3.0,
        fwd_latency_mean: 2.0,
        fwd_latency_std: 0.5,
        duration: 4.5,
        avg_msgs_per_sec: 10.0,
        undecodable: 0,
    }];
    aggregate(&publishers, &subscribers, Duration::from_secs(5))
}

fn summary() -> RunSummary {
    RunSummary {
        distribution: Distribution::Poisson,
        rate: 10.0,
        message_count: 50,
    }
}

#[test]
fn test_format_parsing() {
    assert_eq!("text".parse::<ReportFormat>().unwrap(), ReportFormat::Text);
    assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
    assert!(matches!(
        "xml".parse::<ReportFormat>(),
        Err(BenchError::UnknownFormat(f)) if f == "xml"
    ));
}

#[test]
fn test_text_report_contents() {
    let text = render_text(&sample(), &[], &summary());

    assert!(text.contains("Published using a poisson distribution at 10 msg/sec"));
    assert!(text.contains("=================== PUBLISHER 1 ==================="));
    assert!(text.contains("=================== SUBSCRIBER 1 ==================="));
    assert!(text.contains("================= TOTAL PUBLISHER (1) ================="));
    assert!(text.contains("Total Publish Success Ratio:   100.00% (50/50)"));
    assert!(text.contains("Total Forward Success Ratio:      90.00% (45/50)"));
    assert!(text.contains("Time spent for the benchmark: 5s"));
    assert!(!text.contains("FAILED SESSIONS"));
}

#[test]
fn test_text_report_lists_failures() {
    let failures = vec![
        SessionFailure::new(Role::Subscriber, "2", FailureKind::TimedOut),
        SessionFailure::new(
            Role::Publisher,
            "3",
            FailureKind::Failed("connect failed: refused".to_string()),
        ),
    ];
    let text = render_text(&sample(), &failures, &summary());
    assert!(text.contains("FAILED SESSIONS (2)"));
    assert!(text.contains("subscriber 2 timed out"));
    assert!(text.contains("publisher 3 failed: connect failed: refused"));
}

#[test]
fn test_json_report_shape() {
    let json = render_json(&sample()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["publish runs"][0]["pub_successes"], 50);
    assert_eq!(value["subscribe runs"][0]["fwd_success_ratio"], 0.9);
    assert_eq!(value["publish totals"]["publish_success_ratio"], 1.0);
    assert_eq!(value["receive totals"]["successes"], 45);
}

#[test]
fn test_render_dispatches_on_format() {
    let json = render(ReportFormat::Json, &sample(), &[], &summary()).unwrap();
    assert!(json.trim_start().starts_with('{'));

    let text = render(ReportFormat::Text, &sample(), &[], &summary()).unwrap();
    assert!(text.contains("TOTAL SUBSCRIBER"));
}

#[test]
fn test_nominal_time_rounds() {
    let summary = RunSummary {
        distribution: Distribution::Lognormal { cv: 4.0 },
        rate: 3.0,
        message_count: 10,
    };
    assert_eq!(summary.nominal_secs(), 3.0);
}
