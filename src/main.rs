//! CLI for PopBench
//!
//! Settings come from `config/default`, an optional `--config` file and
//! `POPBENCH__*` environment variables (a `.env` file is honoured); any flag
//! given here overrides them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use popbench::bench::{RunCoordinator, RunPlan, aggregate};
use popbench::config::{Settings, load_config_from};
use popbench::report::{RunSummary, render};
use popbench::transport;
use popbench::utils::{BenchResult, logging};

#[derive(Parser, Debug)]
#[command(name = "popbench", version, about = "Load-testing harness for pub/sub brokers")]
struct Args {
    /// Extra configuration file, layered over config/default
    #[arg(long)]
    config: Option<PathBuf>,
    /// Workload file with publishers, subscribers and nodes
    #[arg(long)]
    file: Option<PathBuf>,
    /// Number of publisher/subscriber pairs when no workload file is given
    #[arg(long)]
    pairs: Option<usize>,
    /// Size of the message payload (bytes)
    #[arg(long)]
    size: Option<usize>,
    /// Number of messages to send per publisher
    #[arg(long)]
    count: Option<u64>,
    /// QoS for published messages
    #[arg(long)]
    pubqos: Option<u8>,
    /// QoS for subscriptions
    #[arg(long)]
    subqos: Option<u8>,
    /// Mean publishing rate per publisher (msg/sec)
    #[arg(long)]
    pubrate: Option<f64>,
    /// Inter-arrival distribution: poisson or lognormal
    #[arg(long)]
    dist: Option<String>,
    /// Coefficient of variation for the lognormal distribution
    #[arg(long)]
    cv: Option<f64>,
    /// Broker username (empty if auth disabled)
    #[arg(long)]
    username: Option<String>,
    /// Broker password (empty if auth disabled)
    #[arg(long)]
    password: Option<String>,
    /// Default broker endpoint, e.g. tcp://localhost:1883
    #[arg(long)]
    broker: Option<String>,
    /// Port applied to workload nodes that do not name one
    #[arg(long)]
    nodeport: Option<u16>,
    /// Transport: mqtt, websocket or memory
    #[arg(long)]
    transport: Option<String>,
    /// Report format: text or json
    #[arg(long)]
    format: Option<String>,
    /// Suppress logs while running
    #[arg(long)]
    quiet: bool,
    /// Seconds to wait between subscribing and publishing
    #[arg(long)]
    settle: Option<f64>,
    /// Seconds to wait for in-flight messages after publishing
    #[arg(long)]
    grace: Option<f64>,
    /// Log level when RUST_LOG is not set
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, mut settings: Settings) -> Settings {
        let broker = &mut settings.broker;
        if let Some(endpoint) = self.broker {
            broker.endpoint = endpoint;
        }
        if let Some(transport) = self.transport {
            broker.transport = transport;
        }
        if self.username.is_some() {
            broker.username = self.username;
        }
        if self.password.is_some() {
            broker.password = self.password;
        }
        if self.nodeport.is_some() {
            broker.node_port = self.nodeport;
        }

        let bench = &mut settings.bench;
        if self.file.is_some() {
            bench.workload_file = self.file;
        }
        if let Some(pairs) = self.pairs {
            bench.pairs = pairs;
        }
        if let Some(size) = self.size {
            bench.message_size = size;
        }
        if let Some(count) = self.count {
            bench.message_count = count;
        }
        if let Some(qos) = self.pubqos {
            bench.pub_qos = qos;
        }
        if let Some(qos) = self.subqos {
            bench.sub_qos = qos;
        }
        if let Some(rate) = self.pubrate {
            bench.rate = rate;
        }
        if let Some(dist) = self.dist {
            bench.distribution = dist;
        }
        if let Some(cv) = self.cv {
            bench.cv = cv;
        }
        if let Some(settle) = self.settle {
            bench.settle_secs = settle;
        }
        if let Some(grace) = self.grace {
            bench.grace_secs = grace;
        }

        let output = &mut settings.output;
        if let Some(format) = self.format {
            output.format = format;
        }
        if let Some(level) = self.log_level {
            output.log_level = level;
        }
        output.quiet |= self.quiet;

        settings
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let settings = match load_config_from(args.config.as_deref()) {
        Ok(settings) => args.apply(settings),
        Err(e) => {
            logging::init("error", false);
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.output.log_level, settings.output.quiet);

    match run(&settings).await {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Benchmark failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: &Settings) -> BenchResult<String> {
    settings.validate()?;
    let params = settings.run_params()?;
    let workload = settings.workload()?;
    let nodes = settings.node_table(&workload)?;
    let plan = RunPlan::build(&workload, &nodes, &params)?;

    let connector = transport::connector(settings.transport_kind()?);
    let coordinator = RunCoordinator::new(connector, settings.coordinator_settings()?);
    let outcome = coordinator.run(plan).await;
    info!(
        run_id = %outcome.run_id,
        publishers = outcome.publishers.len(),
        subscribers = outcome.subscribers.len(),
        failures = outcome.failures.len(),
        "run finished"
    );

    let results = aggregate(&outcome.publishers, &outcome.subscribers, outcome.total_time);
    let summary = RunSummary {
        distribution: params.distribution,
        rate: params.rate,
        message_count: params.message_count,
    };
    render(
        settings.report_format()?,
        &results,
        &outcome.failures,
        &summary,
    )
}
