//! Run orchestration
//!
//! The `RunCoordinator` drives one benchmark run:
//!
//! 1. start every subscriber and wait until each one reports it is subscribed
//! 2. optionally let the broker settle
//! 3. start every publisher and collect their results
//! 4. give in-flight messages a grace period
//! 5. tell the subscribers to stop and collect their results
//!
//! Every wait is bounded by a timeout from `CoordinatorSettings` (`None`
//! waits forever). Sessions that error out, overrun a timeout or panic end up
//! as `SessionFailure`s in the outcome instead of stalling the run.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::plan::RunPlan;
use super::results::{PubResult, SubResult};
use crate::transport::Connector;
use crate::utils::BenchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Publisher,
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum FailureKind {
    Failed(String),
    TimedOut,
    Panicked,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Failed(reason) => write!(f, "failed: {reason}"),
            FailureKind::TimedOut => write!(f, "timed out"),
            FailureKind::Panicked => write!(f, "panicked"),
        }
    }
}

/// A session that did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{role} {id} {kind}")]
pub struct SessionFailure {
    pub role: Role,
    pub id: String,
    pub kind: FailureKind,
}

impl SessionFailure {
    pub fn new(role: Role, id: impl Into<String>, kind: FailureKind) -> Self {
        Self {
            role,
            id: id.into(),
            kind,
        }
    }
}

/// Wait group over spawned sessions of one role.
pub struct SessionGroup<T> {
    role: Role,
    sessions: Vec<(String, JoinHandle<BenchResult<T>>)>,
}

impl<T: Send + 'static> SessionGroup<T> {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            sessions: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, id: impl Into<String>, session: F)
    where
        F: Future<Output = BenchResult<T>> + Send + 'static,
    {
        self.sessions
            .push((id.into(), tokio::spawn(session.in_current_span())));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Aborts the session and forgets it. Returns false for unknown ids.
    pub fn abort(&mut self, id: &str) -> bool {
        match self.sessions.iter().position(|(session, _)| session == id) {
            Some(index) => {
                let (_, handle) = self.sessions.remove(index);
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Waits for every session, sharing one deadline `limit` from now.
    ///
    /// Results come back in spawn order. Sessions still running at the
    /// deadline are aborted and reported as timed out.
    pub async fn join(self, limit: Option<Duration>) -> (Vec<T>, Vec<SessionFailure>) {
        let role = self.role;
        let deadline = limit.and_then(|limit| Instant::now().checked_add(limit));

        let waits = self.sessions.into_iter().map(move |(id, mut handle)| async move {
            let joined = match deadline {
                Some(deadline) => match timeout_at(deadline, &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        handle.abort();
                        return Err(SessionFailure::new(role, id, FailureKind::TimedOut));
                    }
                },
                None => (&mut handle).await,
            };
            match joined {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(SessionFailure::new(role, id, FailureKind::Failed(e.to_string()))),
                Err(e) if e.is_panic() => Err(SessionFailure::new(role, id, FailureKind::Panicked)),
                Err(_) => Err(SessionFailure::new(
                    role,
                    id,
                    FailureKind::Failed("cancelled".to_string()),
                )),
            }
        });

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in join_all(waits).await {
            match outcome {
                Ok(result) => results.push(result),
                Err(failure) => failures.push(failure),
            }
        }
        (results, failures)
    }
}

/// Delays and timeouts of one run. `None` timeouts wait forever.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub settle_delay: Duration,
    pub grace_period: Duration,
    pub subscribe_timeout: Option<Duration>,
    pub publish_timeout: Option<Duration>,
    pub drain_timeout: Option<Duration>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            grace_period: Duration::from_secs(3),
            subscribe_timeout: Some(Duration::from_secs(30)),
            publish_timeout: None,
            drain_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Everything collected from one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub publishers: Vec<PubResult>,
    pub subscribers: Vec<SubResult>,
    /// Wall time from the first publisher start until the last publisher
    /// reported.
    pub total_time: Duration,
    pub failures: Vec<SessionFailure>,
}

pub struct RunCoordinator {
    connector: Arc<dyn Connector>,
    settings: CoordinatorSettings,
}

impl RunCoordinator {
    pub fn new(connector: Arc<dyn Connector>, settings: CoordinatorSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub async fn run(&self, plan: RunPlan) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.execute(run_id, plan).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, plan: RunPlan) -> RunOutcome {
        let mut failures = Vec::new();

        info!(subscribers = plan.subscribers.len(), "starting to subscribe");
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut subscribers = SessionGroup::new(Role::Subscriber);
        let mut ready = Vec::with_capacity(plan.subscribers.len());
        for session in plan.subscribers {
            let id = session.id().to_string();
            let (ready_tx, ready_rx) = oneshot::channel();
            let connector = self.connector.clone();
            let stop = stop_rx.clone();
            subscribers.spawn(id.clone(), async move {
                session.run(connector.as_ref(), ready_tx, stop).await
            });
            ready.push((id, ready_rx));
        }

        let barrier = self
            .settings
            .subscribe_timeout
            .and_then(|limit| Instant::now().checked_add(limit));
        let mut subscribed = 0usize;
        for (id, ready_rx) in ready {
            let signal = match barrier {
                Some(deadline) => timeout_at(deadline, ready_rx).await,
                None => Ok(ready_rx.await),
            };
            match signal {
                Ok(Ok(())) => subscribed += 1,
                // The session ended early; its error is collected with the others.
                Ok(Err(_)) => warn!(id = %id, "subscriber did not subscribe"),
                Err(_) => {
                    warn!(id = %id, "subscriber did not subscribe in time, aborting it");
                    subscribers.abort(&id);
                    failures.push(SessionFailure::new(Role::Subscriber, id, FailureKind::TimedOut));
                }
            }
        }
        info!(subscribed, "all subscription jobs are done");

        if !self.settings.settle_delay.is_zero() {
            info!(delay = ?self.settings.settle_delay, "waiting for the broker to settle");
            sleep(self.settings.settle_delay).await;
        }

        info!(publishers = plan.publishers.len(), "starting publish");
        let started = Instant::now();
        let mut publishers = SessionGroup::new(Role::Publisher);
        for session in plan.publishers {
            let id = session.id().to_string();
            let connector = self.connector.clone();
            publishers.spawn(id, async move { session.run(connector.as_ref()).await });
        }
        let (pub_results, pub_failures) = publishers.join(self.settings.publish_timeout).await;
        let total_time = started.elapsed();
        failures.extend(pub_failures);

        self.countdown().await;

        if stop_tx.send(true).is_err() {
            warn!("no subscriber is listening for the stop signal");
        }
        let (sub_results, sub_failures) = subscribers.join(self.settings.drain_timeout).await;
        failures.extend(sub_failures);

        for failure in &failures {
            error!(role = %failure.role, id = %failure.id, kind = %failure.kind, "session failed");
        }

        RunOutcome {
            run_id,
            publishers: pub_results,
            subscribers: sub_results,
            total_time,
            failures,
        }
    }

    /// Sleeps through the grace period one second at a time, logging the
    /// remaining time.
    async fn countdown(&self) {
        let mut remaining = self.settings.grace_period;
        while !remaining.is_zero() {
            let left = remaining.as_secs_f64().ceil() as u64;
            let step = remaining.min(Duration::from_secs(1));
            sleep(step).await;
            remaining -= step;
            info!("benchmark will stop after {left} seconds");
        }
    }
}
