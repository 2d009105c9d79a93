//! # PopBench
//!
//! `popbench` is a load-testing harness for publish/subscribe brokers. It
//! drives a population of publisher and subscriber sessions against one or
//! more broker nodes, paces publishes with Poisson or lognormal inter-arrival
//! times, measures per-message latency from timestamps carried in the payload
//! and reduces the per-session results into fleet-wide statistics.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `bench`: The engine: rate generation, sessions, run coordination and aggregation.
//! - `config`: Loads settings from files, the environment and defaults.
//! - `report`: Renders results as text or JSON.
//! - `transport`: The broker boundary (`mqtt`, `websocket` and an in-memory loopback).
//! - `workload`: Who publishes and subscribes where, and the node lookup table.
//! - `utils`: Shared error types and logging setup.

pub mod bench;
pub mod config;
pub mod report;
pub mod transport;
pub mod utils;
pub mod workload;
