//! The shared convergence primitive.
//!
//! Every "is it done yet" loop in the driver (node health, rebalance
//! completion, bucket availability, document presence, changes-feed
//! propagation) is one of two shapes: a stateless predicate re-evaluated
//! against each fresh response ([`Poller::until`]), or a stateful fold that
//! threads an accumulator through the loop ([`Poller::fold`]). Both are
//! bounded by an explicit deadline and sleep a fixed interval between
//! attempts; transient fetch errors are retried without special deadline
//! treatment, fatal ones propagate immediately.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Classifies an error as retryable-within-deadline or immediately fatal.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Outcome of one step of a stateful convergence fold.
#[derive(Debug)]
pub enum Step<T, S> {
    /// The terminal state was observed.
    Done(T),
    /// Not converged yet; carry this state into the next round.
    Pending(S),
}

/// Errors terminating a polling loop.
#[derive(Debug, Error)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// The predicate never held within the deadline.
    #[error("{operation}: not converged after {elapsed:?} (deadline {deadline:?})")]
    Timeout {
        operation: String,
        deadline: Duration,
        elapsed: Duration,
    },

    /// The caller's shutdown signal fired mid-poll.
    #[error("{operation}: cancelled by shutdown signal")]
    Cancelled { operation: String },

    /// A non-transient fetch error.
    #[error(transparent)]
    Fatal(E),
}

/// One bounded polling loop. Built per call; holds no state shared across
/// concurrent invocations.
pub struct Poller {
    operation: String,
    deadline: Duration,
    interval: Duration,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl Poller {
    pub fn new(operation: impl Into<String>, deadline: Duration, interval: Duration) -> Self {
        Self {
            operation: operation.into(),
            deadline,
            interval,
            shutdown: None,
        }
    }

    /// Arm the loop with a shutdown receiver so a stuck poll can be aborted
    /// early instead of running out its full deadline.
    pub fn with_shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Poll until `is_done(response)` holds.
    ///
    /// `on_pending` fires for every well-formed response that does not yet
    /// satisfy the predicate; it exists for diagnostics only.
    pub async fn until<R, E, F, Fut, D, N>(
        mut self,
        mut fetch: F,
        mut is_done: D,
        mut on_pending: N,
    ) -> Result<R, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, E>>,
        D: FnMut(&R) -> bool,
        N: FnMut(&R),
        E: std::error::Error + Retryable + 'static,
    {
        let started = Instant::now();
        loop {
            if let Some(err) = self.check_deadline(started) {
                return Err(err);
            }

            match fetch().await {
                Ok(response) if is_done(&response) => {
                    debug!(operation = %self.operation, elapsed = ?started.elapsed(), "converged");
                    return Ok(response);
                }
                Ok(response) => on_pending(&response),
                Err(err) if err.is_transient() => {
                    warn!(operation = %self.operation, error = %err, "transient error, retrying");
                }
                Err(err) => return Err(PollError::Fatal(err)),
            }

            if !self.pause().await {
                return Err(PollError::Cancelled {
                    operation: self.operation,
                });
            }
        }
    }

    /// Poll a stateful fold: `step` consumes the accumulated state and either
    /// finishes or hands back the state for the next round.
    ///
    /// This is for convergence checks that cannot be re-tested from scratch,
    /// e.g. a shrinking expectation set driven by a changes-feed cursor.
    /// The state is cloned before each step so a transient fetch failure can
    /// resume from the last good accumulator.
    pub async fn fold<S, T, E, F, Fut>(mut self, seed: S, mut step: F) -> Result<T, PollError<E>>
    where
        S: Clone,
        F: FnMut(S) -> Fut,
        Fut: Future<Output = Result<Step<T, S>, E>>,
        E: std::error::Error + Retryable + 'static,
    {
        let started = Instant::now();
        let mut state = seed;
        loop {
            if let Some(err) = self.check_deadline(started) {
                return Err(err);
            }

            match step(state.clone()).await {
                Ok(Step::Done(value)) => {
                    debug!(operation = %self.operation, elapsed = ?started.elapsed(), "converged");
                    return Ok(value);
                }
                Ok(Step::Pending(next)) => state = next,
                Err(err) if err.is_transient() => {
                    warn!(operation = %self.operation, error = %err, "transient error, retrying");
                }
                Err(err) => return Err(PollError::Fatal(err)),
            }

            if !self.pause().await {
                return Err(PollError::Cancelled {
                    operation: self.operation,
                });
            }
        }
    }

    fn check_deadline<E>(&self, started: Instant) -> Option<PollError<E>>
    where
        E: std::error::Error + 'static,
    {
        let elapsed = started.elapsed();
        if elapsed > self.deadline {
            Some(PollError::Timeout {
                operation: self.operation.clone(),
                deadline: self.deadline,
                elapsed,
            })
        } else {
            None
        }
    }

    /// Sleep one interval; returns false if the shutdown signal fired first.
    async fn pause(&mut self) -> bool {
        match self.shutdown.as_mut() {
            Some(rx) => tokio::select! {
                _ = sleep(self.interval) => true,
                _ = rx.recv() => false,
            },
            None => {
                sleep(self.interval).await;
                true
            }
        }
    }
}
