//! Exit handlers: cleanup callbacks run exactly once during teardown.
//!
//! Handlers run in LIFO order (last registered runs first), the same order
//! scoped resources are released in. Every handler runs even if an earlier
//! one failed or panicked; failures are collected into an [`ExitReport`].
//!
//! The supervisor drains on tokio's blocking pool, so handlers may block
//! (flush a file, close a pool) without stalling async workers.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error};

use crate::error::{Error, Result};

type ExitHandler = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Outcome of draining the exit handlers.
#[derive(Debug, Default)]
pub(crate) struct ExitReport {
    /// Number of handlers invoked
    pub(crate) invoked: usize,
    /// Failures, in invocation order
    pub(crate) failures: Vec<Error>,
}

impl ExitReport {
    /// Whether every handler completed successfully.
    #[must_use]
    pub(crate) fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Append-only list of exit handlers, closed once drained.
#[derive(Default)]
pub(crate) struct ExitCoordinator {
    /// `None` once draining has started
    handlers: Mutex<Option<Vec<ExitHandler>>>,
}

impl std::fmt::Debug for ExitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.handlers.lock().as_ref().map(Vec::len);
        f.debug_struct("ExitCoordinator")
            .field("pending", &pending)
            .finish()
    }
}

impl ExitCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(Some(Vec::new())),
        }
    }

    /// Append a handler.
    ///
    /// Fails with `ExitHandlersClosed` once draining has started.
    pub(crate) fn register<F>(&self, handler: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut guard = self.handlers.lock();
        let handlers = guard.as_mut().ok_or_else(Error::exit_handlers_closed)?;
        handlers.push(Box::new(handler));
        debug!(count = handlers.len(), "Registered exit handler");
        Ok(())
    }

    pub(crate) fn pending(&self) -> usize {
        self.handlers.lock().as_ref().map_or(0, Vec::len)
    }

    /// Invoke every handler once, last registered first.
    ///
    /// Only the first call runs anything; later calls return an empty report.
    pub(crate) fn drain(&self) -> ExitReport {
        let Some(handlers) = self.handlers.lock().take() else {
            return ExitReport::default();
        };

        let mut report = ExitReport::default();
        for (index, handler) in handlers.into_iter().enumerate().rev() {
            report.invoked += 1;
            let outcome = match catch_unwind(AssertUnwindSafe(handler)) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => Error::exit_handler_with_source(index, e),
                Err(panic) => Error::exit_handler(index, panic_message(panic.as_ref())),
            };
            error!(handler = index, error = %outcome, "Exit handler failed");
            report.failures.push(outcome);
        }

        debug!(
            invoked = report.invoked,
            failed = report.failures.len(),
            "Exit handlers drained"
        );
        report
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}
