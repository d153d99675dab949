//! Ordered log of completed steps for multi-step operations.
//!
//! Create and publish record each side effect in a [`StepLog`] as soon as it
//! has happened.  If a later step fails, [`StepLog::unwind`] undoes exactly
//! the recorded steps, newest first.  An undo failure is logged and does not
//! stop the remaining undos.

use std::fmt::Debug;
use std::future::Future;

use tracing::{debug, warn};

use crate::error::CsiError;

#[derive(Debug)]
pub struct StepLog<S> {
    steps: Vec<S>,
}

impl<S> Default for StepLog<S> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<S: Debug> StepLog<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: S) {
        self.steps.push(step);
    }

    fn len(&self) -> usize {
        self.steps.len()
    }

    /// Undo every recorded step in reverse order.
    pub async fn unwind<F, Fut>(self, mut undo: F)
    where
        F: FnMut(S) -> Fut,
        Fut: Future<Output = Result<(), CsiError>>,
    {
        for step in self.steps.into_iter().rev() {
            let label = format!("{step:?}");
            match undo(step).await {
                Ok(()) => debug!(step = %label, "rolled back"),
                Err(e) => warn!(step = %label, error = %e, "rollback step failed"),
            }
        }
    }

    /// Unwind and hand back `err`, for use in `map_err`-style failure paths.
    pub async fn fail<F, Fut>(self, err: CsiError, undo: F) -> CsiError
    where
        F: FnMut(S) -> Fut,
        Fut: Future<Output = Result<(), CsiError>>,
    {
        warn!(error = %err, steps = self.len(), "operation failed, unwinding");
        self.unwind(undo).await;
        err
    }
}
