use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::bench::{CoordinatorSettings, Distribution, QoS, RunParams};
use crate::report::ReportFormat;
use crate::transport::{Credentials, TransportKind};
use crate::utils::{BenchError, BenchResult};
use crate::workload::{NodeTable, Workload};

/// Top-level configuration settings for the application.
///
/// Includes the broker connection, the benchmark workload and the output
/// settings.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub bench: BenchSettings,
    pub output: OutputSettings,
}

/// Where and how to connect.
///
/// `nodes` maps workload node ids to endpoints; `node_port` is applied to
/// node endpoints that do not name a port.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub transport: String,
    pub endpoint: String,
    pub nodes: BTreeMap<String, String>,
    pub node_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id_prefix: String,
    pub connect_timeout_secs: f64,
    pub ack_timeout_secs: f64,
}

/// What to run. Timeouts of `0` wait forever.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BenchSettings {
    pub workload_file: Option<PathBuf>,
    pub pairs: usize,
    pub message_size: usize,
    pub message_count: u64,
    pub pub_qos: u8,
    pub sub_qos: u8,
    pub rate: f64,
    pub distribution: String,
    pub cv: f64,
    pub settle_secs: f64,
    pub grace_secs: f64,
    pub subscribe_timeout_secs: f64,
    pub publish_timeout_secs: f64,
    pub drain_timeout_secs: f64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct OutputSettings {
    pub format: String,
    pub quiet: bool,
    pub log_level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub bench: Option<PartialBenchSettings>,
    pub output: Option<PartialOutputSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub transport: Option<String>,
    pub endpoint: Option<String>,
    pub nodes: Option<BTreeMap<String, String>>,
    pub node_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id_prefix: Option<String>,
    pub connect_timeout_secs: Option<f64>,
    pub ack_timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBenchSettings {
    pub workload_file: Option<PathBuf>,
    pub pairs: Option<usize>,
    pub message_size: Option<usize>,
    pub message_count: Option<u64>,
    pub pub_qos: Option<u8>,
    pub sub_qos: Option<u8>,
    pub rate: Option<f64>,
    pub distribution: Option<String>,
    pub cv: Option<f64>,
    pub settle_secs: Option<f64>,
    pub grace_secs: Option<f64>,
    pub subscribe_timeout_secs: Option<f64>,
    pub publish_timeout_secs: Option<f64>,
    pub drain_timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialOutputSettings {
    pub format: Option<String>,
    pub quiet: Option<bool>,
    pub log_level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// A single publisher/subscriber pair sends one 100 byte message to a local
/// MQTT broker at one message per second.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings {
                transport: "mqtt".to_string(),
                endpoint: "tcp://localhost:1883".to_string(),
                nodes: BTreeMap::new(),
                node_port: None,
                username: None,
                password: None,
                client_id_prefix: "popbench".to_string(),
                connect_timeout_secs: 10.0,
                ack_timeout_secs: 10.0,
            },
            bench: BenchSettings {
                workload_file: None,
                pairs: 1,
                message_size: 100,
                message_count: 1,
                pub_qos: 0,
                sub_qos: 0,
                rate: 1.0,
                distribution: "poisson".to_string(),
                cv: 4.0,
                settle_secs: 0.0,
                grace_secs: 3.0,
                subscribe_timeout_secs: 30.0,
                publish_timeout_secs: 0.0,
                drain_timeout_secs: 30.0,
            },
            output: OutputSettings {
                format: "text".to_string(),
                quiet: false,
                log_level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        Settings {
            broker: self.broker.unwrap_or_default().merge(defaults.broker),
            bench: self.bench.unwrap_or_default().merge(defaults.bench),
            output: self.output.unwrap_or_default().merge(defaults.output),
        }
    }
}

impl PartialBrokerSettings {
    fn merge(self, d: BrokerSettings) -> BrokerSettings {
        BrokerSettings {
            transport: self.transport.unwrap_or(d.transport),
            endpoint: self.endpoint.unwrap_or(d.endpoint),
            nodes: self.nodes.unwrap_or(d.nodes),
            node_port: self.node_port.or(d.node_port),
            username: self.username.or(d.username),
            password: self.password.or(d.password),
            client_id_prefix: self.client_id_prefix.unwrap_or(d.client_id_prefix),
            connect_timeout_secs: self.connect_timeout_secs.unwrap_or(d.connect_timeout_secs),
            ack_timeout_secs: self.ack_timeout_secs.unwrap_or(d.ack_timeout_secs),
        }
    }
}

impl PartialBenchSettings {
    fn merge(self, d: BenchSettings) -> BenchSettings {
        BenchSettings {
            workload_file: self.workload_file.or(d.workload_file),
            pairs: self.pairs.unwrap_or(d.pairs),
            message_size: self.message_size.unwrap_or(d.message_size),
            message_count: self.message_count.unwrap_or(d.message_count),
            pub_qos: self.pub_qos.unwrap_or(d.pub_qos),
            sub_qos: self.sub_qos.unwrap_or(d.sub_qos),
            rate: self.rate.unwrap_or(d.rate),
            distribution: self.distribution.unwrap_or(d.distribution),
            cv: self.cv.unwrap_or(d.cv),
            settle_secs: self.settle_secs.unwrap_or(d.settle_secs),
            grace_secs: self.grace_secs.unwrap_or(d.grace_secs),
            subscribe_timeout_secs: self
                .subscribe_timeout_secs
                .unwrap_or(d.subscribe_timeout_secs),
            publish_timeout_secs: self.publish_timeout_secs.unwrap_or(d.publish_timeout_secs),
            drain_timeout_secs: self.drain_timeout_secs.unwrap_or(d.drain_timeout_secs),
        }
    }
}

impl PartialOutputSettings {
    fn merge(self, d: OutputSettings) -> OutputSettings {
        OutputSettings {
            format: self.format.unwrap_or(d.format),
            quiet: self.quiet.unwrap_or(d.quiet),
            log_level: self.log_level.unwrap_or(d.log_level),
        }
    }
}

fn seconds(name: &str, value: f64) -> BenchResult<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        BenchError::Config(format!(
            "{name} must be a non-negative number of seconds, got {value}"
        ))
    })
}

fn positive_seconds(name: &str, value: f64) -> BenchResult<Duration> {
    let duration = seconds(name, value)?;
    if duration.is_zero() {
        return Err(BenchError::Config(format!("{name} must be greater than zero")));
    }
    Ok(duration)
}

/// `0` means no limit.
fn limit(name: &str, value: f64) -> BenchResult<Option<Duration>> {
    let duration = seconds(name, value)?;
    Ok((!duration.is_zero()).then_some(duration))
}

impl Settings {
    pub fn transport_kind(&self) -> BenchResult<TransportKind> {
        self.broker.transport.parse()
    }

    pub fn report_format(&self) -> BenchResult<ReportFormat> {
        self.output.format.parse()
    }

    pub fn distribution(&self) -> BenchResult<Distribution> {
        Distribution::parse(&self.bench.distribution, self.bench.cv)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(
            self.broker.username.as_deref(),
            self.broker.password.as_deref(),
        )
    }

    pub fn run_params(&self) -> BenchResult<RunParams> {
        let rate = self.bench.rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(BenchError::InvalidRate(rate));
        }
        Ok(RunParams {
            message_size: self.bench.message_size,
            message_count: self.bench.message_count,
            pub_qos: QoS::try_from(self.bench.pub_qos)?,
            sub_qos: QoS::try_from(self.bench.sub_qos)?,
            rate,
            distribution: self.distribution()?,
            client_id_prefix: self.broker.client_id_prefix.clone(),
            credentials: self.credentials(),
            connect_timeout: positive_seconds(
                "broker.connect_timeout_secs",
                self.broker.connect_timeout_secs,
            )?,
            ack_timeout: positive_seconds("broker.ack_timeout_secs", self.broker.ack_timeout_secs)?,
        })
    }

    pub fn coordinator_settings(&self) -> BenchResult<CoordinatorSettings> {
        Ok(CoordinatorSettings {
            settle_delay: seconds("bench.settle_secs", self.bench.settle_secs)?,
            grace_period: seconds("bench.grace_secs", self.bench.grace_secs)?,
            subscribe_timeout: limit(
                "bench.subscribe_timeout_secs",
                self.bench.subscribe_timeout_secs,
            )?,
            publish_timeout: limit("bench.publish_timeout_secs", self.bench.publish_timeout_secs)?,
            drain_timeout: limit("bench.drain_timeout_secs", self.bench.drain_timeout_secs)?,
        })
    }

    /// The workload file when one is configured, generated pairs otherwise.
    pub fn workload(&self) -> BenchResult<Workload> {
        match &self.bench.workload_file {
            Some(path) => Workload::load(path),
            None => Workload::pairs(self.bench.pairs),
        }
    }

    pub fn node_table(&self, workload: &Workload) -> BenchResult<NodeTable> {
        NodeTable::resolve(
            &self.broker.endpoint,
            &workload.nodes,
            &self.broker.nodes,
            self.broker.node_port,
        )
    }

    /// Checks every value that does not need the workload file.
    pub fn validate(&self) -> BenchResult<()> {
        self.transport_kind()?;
        self.report_format()?;
        self.run_params()?;
        self.coordinator_settings()?;
        if self.bench.workload_file.is_none() && self.bench.pairs == 0 {
            return Err(BenchError::InvalidClientCount(0));
        }
        Ok(())
    }
}
