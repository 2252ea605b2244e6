//! Parallel execution of independent work units.
//!
//! [`WorkerPool`] fans a slice of units out over a fixed number of scoped threads. Units
//! are pulled from a shared counter, so fast workers pick up more work, and results are
//! returned in unit order no matter which worker finished first.
//!
//! # Failure policy
//!
//! - A unit returning an error, or panicking, stops the pool: no new units are started
//!   and the error is returned with the failing unit's identity attached. A unit is never
//!   silently dropped.
//! - A [`CancelToken`] that is cancelled or past its deadline also stops the pool; the
//!   caller receives [`EngineError::Cancelled`] or [`EngineError::Timeout`], never a
//!   partial result.

use std::{
    any::Any,
    fmt,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crate::error::{EngineError, Result};

/// Why a run stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    TimedOut { elapsed: Duration },
}

impl Interruption {
    /// Converts into the run-level error, with progress counts.
    #[must_use]
    pub fn into_error(self, completed_units: usize, total_units: usize) -> EngineError {
        match self {
            Interruption::Cancelled => EngineError::Cancelled {
                completed_units,
                total_units,
            },
            Interruption::TimedOut { elapsed } => EngineError::Timeout {
                elapsed,
                completed_units,
                total_units,
            },
        }
    }
}

#[derive(Debug)]
struct TokenState {
    started: Instant,
    deadline: Option<Instant>,
    cancelled: AtomicBool,
}

/// Shared cancellation flag with an optional run deadline.
///
/// Cloning yields a handle to the same token, so a caller can keep one clone and cancel
/// the run from another thread.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CancelToken {
    /// Creates a token whose deadline (if any) starts counting now.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        let started = Instant::now();
        Self {
            state: Arc::new(TokenState {
                started,
                deadline: timeout.map(|t| started + t),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Requests cancellation of every unit observing this token.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Relaxed);
    }

    /// Time since the token was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.started.elapsed()
    }

    /// Returns the reason to stop, if any.
    #[must_use]
    pub fn interruption(&self) -> Option<Interruption> {
        if self.state.cancelled.load(Ordering::Relaxed) {
            return Some(Interruption::Cancelled);
        }
        let deadline = self.state.deadline?;
        let now = Instant::now();
        (now >= deadline).then(|| Interruption::TimedOut {
            elapsed: now - self.state.started,
        })
    }

    /// Fails with the interruption error (progress counts filled in by the pool).
    pub fn check(&self) -> Result<()> {
        match self.interruption() {
            Some(interruption) => Err(interruption.into_error(0, 0)),
            None => Ok(()),
        }
    }
}

/// Fixed-size pool of scoped worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: NonZeroUsize,
}

impl WorkerPool {
    /// Creates a pool with `workers` threads (at least one).
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Creates a pool sized to the available CPU cores, optionally capped.
    #[must_use]
    pub fn with_available_parallelism(cap: Option<usize>) -> Self {
        let available = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self::new(cap.map_or(available, |cap| available.min(cap)))
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Runs `work` on every unit and returns the results in unit order.
    ///
    /// `work` receives a shared reference to its unit and must not rely on the order in
    /// which units run.
    pub fn run<U, T, F>(&self, units: &[U], token: &CancelToken, work: F) -> Result<Vec<T>>
    where
        U: fmt::Display + Sync,
        T: Send,
        F: Fn(&U) -> Result<T> + Sync,
    {
        let total = units.len();
        if total == 0 {
            return Ok(vec![]);
        }
        let threads = self.workers().min(total);
        tracing::debug!(units = total, threads, "dispatching work units");

        let next = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);

        let worker = || {
            let mut outcomes = vec![];
            while !stop.load(Ordering::Relaxed) {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(unit) = units.get(index) else {
                    break;
                };
                if let Some(interruption) = token.interruption() {
                    stop.store(true, Ordering::Relaxed);
                    outcomes.push((index, Err(interruption.into_error(0, 0))));
                    break;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(unit)))
                    .unwrap_or_else(|payload| {
                        Err(EngineError::WorkerExecution {
                            unit: unit.to_string(),
                            message: format!("panicked: {}", panic_message(payload.as_ref())),
                        })
                    })
                    .map_err(|err| attach_unit(err, unit));
                if outcome.is_ok() {
                    completed.fetch_add(1, Ordering::Relaxed);
                } else {
                    stop.store(true, Ordering::Relaxed);
                }
                outcomes.push((index, outcome));
            }
            outcomes
        };

        let mut outcomes = thread::scope(|s| {
            let handles = (0..threads).map(|_| s.spawn(worker)).collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle.join().unwrap_or_else(|payload| {
                        vec![(
                            usize::MAX,
                            Err(EngineError::WorkerExecution {
                                unit: "worker thread".to_owned(),
                                message: format!("panicked: {}", panic_message(payload.as_ref())),
                            }),
                        )]
                    })
                })
                .collect::<Vec<_>>()
        });
        outcomes.sort_by_key(|(index, _)| *index);

        let completed = completed.load(Ordering::Relaxed);
        let mut interrupted = None;
        let mut results = Vec::with_capacity(total);
        for (_, outcome) in outcomes {
            match outcome {
                Ok(value) => results.push(value),
                Err(EngineError::Cancelled { .. } | EngineError::Timeout { .. })
                    if interrupted.is_some() => {}
                Err(EngineError::Cancelled { .. }) => {
                    interrupted = Some(Interruption::Cancelled);
                }
                Err(EngineError::Timeout { elapsed, .. }) => {
                    interrupted = Some(Interruption::TimedOut { elapsed });
                }
                // real failures take precedence over interruptions, lowest unit first
                Err(err) => return Err(err),
            }
        }
        if let Some(interruption) = interrupted {
            return Err(interruption.into_error(completed, total));
        }
        if let Some(interruption) = token.interruption()
            && results.len() < total
        {
            return Err(interruption.into_error(completed, total));
        }
        debug_assert_eq!(results.len(), total);
        Ok(results)
    }
}

/// Prefixes a worker failure with the identity of the unit it happened in.
fn attach_unit<U>(err: EngineError, unit: &U) -> EngineError
where
    U: fmt::Display,
{
    match err {
        EngineError::WorkerExecution {
            unit: inner,
            message,
        } => EngineError::WorkerExecution {
            unit: if inner.is_empty() {
                unit.to_string()
            } else {
                format!("{unit}, {inner}")
            },
            message,
        },
        other => other,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
