//! Fixed-interval polling with an optional deadline.
//!
//! The poller is the only place a task waits on remote convergence. Each
//! wait is a timer-based suspension, so many groups and instances can be
//! watched concurrently on one runtime. Probe errors end the watch; they
//! are never retried.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::error::{FleetError, FleetResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
    deadline: Option<Duration>,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Give up once `deadline` has elapsed since the first probe.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Call `probe` until `done` accepts its result.
    ///
    /// The first probe runs immediately, later ones every `interval`. When
    /// the deadline passes without a terminal result this fails with
    /// [`FleetError::Timeout`] carrying the last observed status. A probe
    /// still in flight at the deadline is dropped. The remote operation
    /// itself is left running.
    pub async fn until<S, F, Fut, D>(&self, operation: &str, mut probe: F, mut done: D) -> FleetResult<S>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FleetResult<S>>,
        D: FnMut(&S) -> bool,
        S: fmt::Debug,
    {
        let started = Instant::now();
        let expires = self.deadline.map(|d| started + d);
        let mut attempts: u32 = 0;
        let mut last_status: Option<String> = None;

        loop {
            let status = match expires {
                Some(at) => match tokio::time::timeout_at(at, probe()).await {
                    Ok(result) => result?,
                    Err(_) => return Err(timeout(operation, started, last_status)),
                },
                None => probe().await?,
            };
            attempts += 1;

            if done(&status) {
                trace!(%operation, attempts, "poll reached terminal state");
                return Ok(status);
            }

            trace!(%operation, attempts, ?status, "not terminal yet");
            let rendered = format!("{status:?}");

            let pause = match expires {
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        return Err(timeout(operation, started, Some(rendered)));
                    }
                    self.interval.min(at - now)
                }
                None => self.interval,
            };
            last_status = Some(rendered);
            tokio::time::sleep(pause).await;
        }
    }
}

fn timeout(operation: &str, started: Instant, last_status: Option<String>) -> FleetError {
    FleetError::Timeout {
        operation: operation.to_string(),
        elapsed: started.elapsed(),
        last_status: last_status.unwrap_or_else(|| "no status observed".to_string()),
    }
}
