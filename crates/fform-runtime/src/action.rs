#![forbid(unsafe_code)]

//! Single-flight execution of the submit action.
//!
//! [`ActionExecutor::begin`] either refuses (no action configured, or one is
//! already running and concurrency is off) or hands back an [`ActionRun`].
//! The run holds an in-progress guard: the `in_progress` flag is raised on
//! `begin` and dropped when the last live run is finished or dropped, so a
//! panicking or cancelled action can never leave it stuck.

use std::cell::Cell;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use fform_core::Value;
use thiserror::Error;
use web_time::Instant;

use crate::async_validation::LocalBoxFuture;
use crate::observe::Tracked;
use crate::reactive::Observable;

/// The user action: tracked data and call parameters in, completion out.
pub type ActionFn = Rc<dyn Fn(Tracked, Value) -> LocalBoxFuture<'static, Result<(), ActionError>>>;

/// Box an async closure as an [`ActionFn`].
pub fn action<F, Fut>(f: F) -> ActionFn
where
    F: Fn(Tracked, Value) -> Fut + 'static,
    Fut: Future<Output = Result<(), ActionError>> + 'static,
{
    Rc::new(move |data, params| Box::pin(f(data, params)))
}

/// How an action settled.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    /// A recognized error value. Stored on the engine's `action_error`.
    #[error("{0}")]
    Failed(Arc<dyn StdError + Send + Sync>),

    /// Rejection with an arbitrary payload. Forwarded to the completion
    /// hook but not stored.
    #[error("action rejected with {0}")]
    Rejected(Value),
}

impl ActionError {
    pub fn failed(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Failed(Arc::new(error))
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        let boxed: Box<dyn StdError + Send + Sync> = message.into().into();
        Self::Failed(Arc::from(boxed))
    }

    #[must_use]
    pub fn rejected(payload: impl Into<Value>) -> Self {
        Self::Rejected(payload.into())
    }

    /// Whether this error is kept for observation.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl PartialEq for ActionError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Failed(a), Self::Failed(b)) => Arc::ptr_eq(a, b),
            (Self::Rejected(a), Self::Rejected(b)) => a == b,
            _ => false,
        }
    }
}

/// Result of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    Failed,
    /// Not started: no action configured, or another one is in flight.
    Ignored,
}

struct ExecutorInner {
    action: Option<ActionFn>,
    allow_concurrent: bool,
    running: Cell<usize>,
    in_progress: Observable<bool>,
    error: Observable<Option<ActionError>>,
}

pub struct ActionExecutor {
    inner: Rc<ExecutorInner>,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("configured", &self.inner.action.is_some())
            .field("allow_concurrent", &self.inner.allow_concurrent)
            .field("running", &self.inner.running.get())
            .finish()
    }
}

impl ActionExecutor {
    #[must_use]
    pub fn new(action: Option<ActionFn>, allow_concurrent: bool) -> Self {
        Self {
            inner: Rc::new(ExecutorInner {
                action,
                allow_concurrent,
                running: Cell::new(0),
                in_progress: Observable::new(false),
                error: Observable::new(None),
            }),
        }
    }

    #[must_use]
    pub fn in_progress(&self) -> &Observable<bool> {
        &self.inner.in_progress
    }

    /// Last recognized action error.
    #[must_use]
    pub fn error(&self) -> &Observable<Option<ActionError>> {
        &self.inner.error
    }

    pub fn clear_error(&self) {
        self.inner.error.set(None);
    }

    /// Number of runs currently alive.
    #[must_use]
    pub fn running(&self) -> usize {
        self.inner.running.get()
    }

    /// Start a run, clearing any stored error. `None` when the call must be
    /// ignored.
    pub fn begin(&self) -> Option<ActionRun> {
        let Some(action) = self.inner.action.clone() else {
            tracing::debug!("execute called without an action, ignored");
            return None;
        };
        if self.inner.running.get() > 0 && !self.inner.allow_concurrent {
            tracing::debug!("action already in progress, ignored");
            return None;
        }
        self.inner.error.set(None);
        self.inner.running.set(self.inner.running.get() + 1);
        self.inner.in_progress.set(true);
        Some(ActionRun {
            executor: Rc::clone(&self.inner),
            action,
            started: Instant::now(),
        })
    }
}

/// One admitted action call. Dropping it releases the in-progress guard.
pub struct ActionRun {
    executor: Rc<ExecutorInner>,
    action: ActionFn,
    started: Instant,
}

impl fmt::Debug for ActionRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRun")
            .field("elapsed", &self.started.elapsed())
            .finish_non_exhaustive()
    }
}

impl ActionRun {
    pub async fn invoke(&self, data: Tracked, params: Value) -> Result<(), ActionError> {
        (self.action)(data, params).await
    }

    /// Record the outcome and release the guard.
    pub fn finish(self, result: &Result<(), ActionError>) -> ActionOutcome {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        match result {
            Ok(()) => {
                tracing::debug!(elapsed_ms, "action completed");
                ActionOutcome::Completed
            }
            Err(error) => {
                tracing::warn!(elapsed_ms, %error, "action failed");
                let stored = error.is_recognized().then(|| error.clone());
                self.executor.error.set(stored);
                ActionOutcome::Failed
            }
        }
    }
}

impl Drop for ActionRun {
    fn drop(&mut self) {
        let running = self.executor.running.get().saturating_sub(1);
        self.executor.running.set(running);
        if running == 0 {
            self.executor.in_progress.set(false);
        }
    }
}
