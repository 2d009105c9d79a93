//! The `bench` module is the benchmark engine.
//!
//! - `rate`: inter-message delays (Poisson or lognormal)
//! - `message`: benchmark messages and the in-band timestamp format
//! - `stats`: latency samples and summary statistics
//! - `publisher` / `subscriber`: one session per client
//! - `plan`: workload + configuration -> sessions
//! - `coordinator`: subscribe barrier, publish phase, grace period, drain
//! - `results` / `aggregate`: per-session results and fleet totals

pub mod aggregate;
pub mod coordinator;
pub mod message;
pub mod plan;
pub mod publisher;
pub mod rate;
pub mod results;
pub mod stats;
pub mod subscriber;

pub use aggregate::aggregate;
pub use coordinator::{
    CoordinatorSettings, FailureKind, Role, RunCoordinator, RunOutcome, SessionFailure,
    SessionGroup,
};
pub use message::QoS;
pub use plan::{RunParams, RunPlan};
pub use rate::{Distribution, RateGenerator};
pub use results::{Aggregate, PubResult, PubTotals, SubResult, SubTotals};
