use std::io::Write;
use std::time::Duration;

use serial_test::serial;

use super::settings::{PartialBenchSettings, PartialSettings, Settings};
use super::{load_config, load_config_from};
use crate::bench::{Distribution, QoS};
use crate::report::ReportFormat;
use crate::transport::TransportKind;
use crate::utils::BenchError;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.transport, "mqtt");
    assert_eq!(settings.broker.endpoint, "tcp://localhost:1883");
    assert_eq!(settings.bench.pairs, 1);
    assert_eq!(settings.bench.message_size, 100);
    assert_eq!(settings.bench.message_count, 1);
    assert_eq!(settings.bench.rate, 1.0);
    assert_eq!(settings.bench.distribution, "poisson");
    assert_eq!(settings.bench.cv, 4.0);
    assert_eq!(settings.bench.grace_secs, 3.0);
    assert_eq!(settings.output.format, "text");
    assert!(!settings.output.quiet);
    assert!(settings.validate().is_ok());
}

#[test]
fn test_partial_merge_keeps_defaults() {
    let partial = PartialSettings {
        bench: Some(PartialBenchSettings {
            rate: Some(25.0),
            message_count: Some(500),
            ..Default::default()
        }),
        ..Default::default()
    };
    let settings = partial.merge(Settings::default());
    assert_eq!(settings.bench.rate, 25.0);
    assert_eq!(settings.bench.message_count, 500);
    assert_eq!(settings.bench.message_size, 100);
    assert_eq!(settings.broker, Settings::default().broker);
}

#[test]
#[serial]
fn test_load_config_reads_environment() {
    temp_env::with_vars(
        [
            ("POPBENCH__BENCH__RATE", Some("20")),
            ("POPBENCH__BENCH__MESSAGE_COUNT", Some("300")),
            ("POPBENCH__BROKER__TRANSPORT", Some("websocket")),
            ("POPBENCH__OUTPUT__QUIET", Some("true")),
        ],
        || {
            let settings = load_config().unwrap();
            assert_eq!(settings.bench.rate, 20.0);
            assert_eq!(settings.bench.message_count, 300);
            assert_eq!(settings.broker.transport, "websocket");
            assert!(settings.output.quiet);
            assert_eq!(settings.bench.message_size, 100);
        },
    );
}

#[test]
#[serial]
fn test_load_config_without_overrides_is_default() {
    temp_env::with_vars_unset(
        [
            "POPBENCH__BENCH__RATE",
            "POPBENCH__BENCH__MESSAGE_COUNT",
            "POPBENCH__BROKER__TRANSPORT",
            "POPBENCH__OUTPUT__QUIET",
        ],
        || {
            let settings = load_config().unwrap();
            assert_eq!(settings, Settings::default());
        },
    );
}

#[test]
#[serial]
fn test_load_config_from_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    writeln!(
        file,
        r#"
[broker]
endpoint = "tcp://10.0.0.1:1883"
node_port = 30123

[broker.nodes]
0 = "tcp://10.0.0.2"

[bench]
pairs = 4
distribution = "lognormal"
cv = 2.5
"#
    )
    .unwrap();

    temp_env::with_var("POPBENCH__BENCH__PAIRS", Some("6"), || {
        let settings = load_config_from(Some(file.path())).unwrap();
        assert_eq!(settings.broker.endpoint, "tcp://10.0.0.1:1883");
        assert_eq!(settings.broker.node_port, Some(30123));
        assert_eq!(
            settings.broker.nodes.get("0").map(String::as_str),
            Some("tcp://10.0.0.2")
        );
        // Environment wins over the file.
        assert_eq!(settings.bench.pairs, 6);
        assert_eq!(
            settings.distribution().unwrap(),
            Distribution::Lognormal { cv: 2.5 }
        );
    });
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    let result = load_config_from(Some(std::path::Path::new("/no/such/popbench.toml")));
    assert!(result.is_err());
}

#[test]
fn test_typed_accessors() {
    let mut settings = Settings::default();
    settings.broker.transport = "ws".to_string();
    settings.output.format = "json".to_string();
    settings.bench.pub_qos = 1;
    settings.bench.sub_qos = 2;
    settings.broker.username = Some("admin".to_string());
    settings.broker.password = Some("secret".to_string());

    assert_eq!(settings.transport_kind().unwrap(), TransportKind::Websocket);
    assert_eq!(settings.report_format().unwrap(), ReportFormat::Json);

    let params = settings.run_params().unwrap();
    assert_eq!(params.pub_qos, QoS::AtLeastOnce);
    assert_eq!(params.sub_qos, QoS::ExactlyOnce);
    assert_eq!(params.credentials.unwrap().username, "admin");
    assert_eq!(params.connect_timeout, Duration::from_secs(10));
}

#[test]
fn test_credentials_need_both_parts() {
    let mut settings = Settings::default();
    settings.broker.username = Some("admin".to_string());
    assert!(settings.credentials().is_none());
    settings.broker.password = Some(String::new());
    assert!(settings.credentials().is_none());
}

#[test]
fn test_coordinator_settings_zero_means_unbounded() {
    let mut settings = Settings::default();
    settings.bench.subscribe_timeout_secs = 0.0;
    settings.bench.publish_timeout_secs = 12.5;
    settings.bench.settle_secs = 1.5;

    let coordinator = settings.coordinator_settings().unwrap();
    assert_eq!(coordinator.subscribe_timeout, None);
    assert_eq!(coordinator.publish_timeout, Some(Duration::from_millis(12_500)));
    assert_eq!(coordinator.drain_timeout, Some(Duration::from_secs(30)));
    assert_eq!(coordinator.settle_delay, Duration::from_millis(1_500));
    assert_eq!(coordinator.grace_period, Duration::from_secs(3));
}

#[test]
fn test_validation_errors() {
    let mut settings = Settings::default();
    settings.bench.distribution = "gaussian".to_string();
    assert!(matches!(
        settings.validate(),
        Err(BenchError::UnknownDistribution(_))
    ));

    let mut settings = Settings::default();
    settings.bench.rate = 0.0;
    assert!(matches!(settings.validate(), Err(BenchError::InvalidRate(_))));

    let mut settings = Settings::default();
    settings.bench.pub_qos = 3;
    assert!(matches!(settings.validate(), Err(BenchError::InvalidQos(3))));

    let mut settings = Settings::default();
    settings.bench.pairs = 0;
    assert!(matches!(
        settings.validate(),
        Err(BenchError::InvalidClientCount(0))
    ));

    let mut settings = Settings::default();
    settings.bench.grace_secs = -1.0;
    assert!(matches!(settings.validate(), Err(BenchError::Config(_))));

    let mut settings = Settings::default();
    settings.broker.ack_timeout_secs = 0.0;
    assert!(matches!(settings.validate(), Err(BenchError::Config(_))));

    let mut settings = Settings::default();
    settings.output.format = "yaml".to_string();
    assert!(matches!(settings.validate(), Err(BenchError::UnknownFormat(_))));

    let mut settings = Settings::default();
    settings.broker.transport = "amqp".to_string();
    assert!(matches!(
        settings.validate(),
        Err(BenchError::UnknownTransport(_))
    ));
}

#[test]
fn test_workload_defaults_to_pairs() {
    let mut settings = Settings::default();
    settings.bench.pairs = 3;
    let workload = settings.workload().unwrap();
    assert_eq!(workload.publishers.len(), 3);

    let nodes = settings.node_table(&workload).unwrap();
    assert_eq!(nodes.default_endpoint().host(), "localhost");
}
