//! Memoized evaluation of coalition values inside one work unit.

use std::cell::Cell;

use crate::{
    cache::MemoCache,
    coalition::Coalition,
    error::{EngineError, Result},
    scheduler::CancelToken,
    value::CoalitionValue,
};

/// How many fresh evaluations happen between cancellation checks.
const CANCEL_CHECK_INTERVAL: u32 = 256;

/// Per-unit view of the value function, the shared cache and the run's cancel token.
///
/// An evaluator is created by a worker for the unit it is processing and never crosses
/// threads; only the cache and token behind it are shared.
pub struct CoalitionEvaluator<'a> {
    value_fn: &'a dyn CoalitionValue,
    cache: &'a MemoCache,
    token: &'a CancelToken,
    since_check: Cell<u32>,
}

impl<'a> CoalitionEvaluator<'a> {
    #[must_use]
    pub fn new(
        value_fn: &'a dyn CoalitionValue,
        cache: &'a MemoCache,
        token: &'a CancelToken,
    ) -> Self {
        Self {
            value_fn,
            cache,
            token,
            since_check: Cell::new(0),
        }
    }

    /// Returns `v(S)`, consulting the cache first.
    ///
    /// The empty coalition is worth 0 regardless of the value function. A non-finite
    /// value aborts the unit with [`EngineError::WorkerExecution`].
    pub fn value(&self, coalition: &Coalition) -> Result<f64> {
        if coalition.is_empty() {
            return Ok(0.0);
        }
        if let Some(value) = self.cache.get(coalition) {
            return Ok(value);
        }

        let since = self.since_check.get() + 1;
        if since >= CANCEL_CHECK_INTERVAL {
            self.since_check.set(0);
            self.token.check()?;
        } else {
            self.since_check.set(since);
        }

        let value = self.value_fn.value(coalition);
        if !value.is_finite() {
            return Err(EngineError::WorkerExecution {
                unit: format!("coalition {coalition}"),
                message: format!("value function returned {value}"),
            });
        }
        self.cache.insert(coalition.clone(), value);
        Ok(value)
    }
}
