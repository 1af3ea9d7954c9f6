#![forbid(unsafe_code)]

//! Per-path asynchronous validation.
//!
//! # Design
//!
//! Validators are registered against dotted paths. A change at path `P`
//! reschedules every registered path related to `P` (equal, ancestor or
//! descendant). Each scheduled run is tracked by a [`Tracker`] holding a
//! generation number, a [`CancelHandle`], and the local task running it.
//!
//! Rescheduling a path signals and aborts the previous run before arming the
//! new one, so at most one run per path is alive. A run publishes only if its
//! signal is still clear and its generation is still the current tracker's,
//! which keeps a superseded run from ever writing into the error map or
//! removing a newer tracker.
//!
//! When the debounce elapses, the run first consults the *synchronous*
//! error tree: if it already holds an error at the registered path, the run
//! ends without calling the validator and publishes nothing.
//!
//! # Failure Modes
//!
//! - **Validator returns `Cancelled`, or fails after its signal fired**:
//!   swallowed.
//! - **Validator returns `Failed` while not cancelled**: a validator defect.
//!   Nothing is published for the path. The defect is logged at `error`,
//!   stored on the [`defect`](AsyncValidationCoordinator::defect) signal and
//!   handed to every listener's `on_validator_defect`. It stays there until
//!   taken, so the caller sees it on its next check whatever the build's
//!   panic strategy. The tracker and validating flag are cleaned up as usual.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::time::Duration;

use fform_core::path::related;
use fform_core::{ErrorTree, FieldPath, Value};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::cancel::{CancelHandle, CancelSignal};
use crate::error::{EngineError, Result};
use crate::listener::Listeners;
use crate::observe::Tracked;
use crate::reactive::Observable;

pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// `(value at path, root snapshot, cancel signal) -> error message`.
/// An empty message means the field is valid.
pub type AsyncValidator =
    Rc<dyn Fn(Value, Value, CancelSignal) -> LocalBoxFuture<'static, Verdict>>;

/// Outcome of one async validator call.
pub type Verdict = std::result::Result<String, AsyncValidationError>;

/// Box an async closure as an [`AsyncValidator`].
pub fn async_validator<F, Fut>(f: F) -> AsyncValidator
where
    F: Fn(Value, Value, CancelSignal) -> Fut + 'static,
    Fut: Future<Output = Verdict> + 'static,
{
    Rc::new(move |value, root, signal| Box::pin(f(value, root, signal)))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsyncValidationError {
    #[error("validation cancelled")]
    Cancelled,

    #[error("validator failed: {0}")]
    Failed(String),
}

impl AsyncValidationError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A non-cancelled [`AsyncValidationError::Failed`] from the validator at
/// `path`. `generation` identifies the run, so two identical failures are
/// still two defects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("async validator for {path:?} failed: {message}")]
pub struct ValidatorDefect {
    pub path: String,
    pub message: String,
    pub generation: u64,
}

struct Registration {
    path: FieldPath,
    validator: AsyncValidator,
}

/// Bookkeeping for one scheduled or running validation.
struct Tracker {
    generation: u64,
    handle: CancelHandle,
    task: JoinHandle<()>,
}

impl Tracker {
    fn stop(self) {
        self.handle.cancel();
        self.task.abort();
    }
}

struct CoordinatorInner {
    registrations: BTreeMap<String, Registration>,
    debounce: Duration,
    clear_on_change: bool,
    data: Tracked,
    sync_errors: Observable<ErrorTree>,
    errors: Observable<BTreeMap<String, String>>,
    validating: Observable<BTreeSet<String>>,
    defect: Observable<Option<ValidatorDefect>>,
    listeners: Listeners,
    trackers: RefCell<HashMap<String, Tracker>>,
    next_generation: Cell<u64>,
}

impl CoordinatorInner {
    fn is_current(&self, key: &str, generation: u64) -> bool {
        self.trackers
            .borrow()
            .get(key)
            .is_some_and(|t| t.generation == generation)
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        for (_, tracker) in self.trackers.get_mut().drain() {
            tracker.stop();
        }
    }
}

pub struct AsyncValidationCoordinator {
    inner: Rc<CoordinatorInner>,
}

impl fmt::Debug for AsyncValidationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValidationCoordinator")
            .field("paths", &self.inner.registrations.keys().collect::<Vec<_>>())
            .field("debounce", &self.inner.debounce)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl AsyncValidationCoordinator {
    /// Build a coordinator. Registration paths must be non-empty, valid
    /// dotted paths, each registered once.
    pub fn new(
        registrations: Vec<(String, AsyncValidator)>,
        debounce: Duration,
        clear_on_change: bool,
        data: Tracked,
        sync_errors: Observable<ErrorTree>,
        listeners: Listeners,
    ) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (key, validator) in registrations {
            let path = FieldPath::parse(&key)
                .map_err(|e| EngineError::registration(key.as_str(), e.to_string()))?;
            if path.is_root() {
                return Err(EngineError::registration(key, "the root cannot be validated"));
            }
            if table.contains_key(&key) {
                return Err(EngineError::registration(key, "registered twice"));
            }
            table.insert(key, Registration { path, validator });
        }
        Ok(Self {
            inner: Rc::new(CoordinatorInner {
                registrations: table,
                debounce,
                clear_on_change,
                data,
                sync_errors,
                errors: Observable::new(BTreeMap::new()),
                validating: Observable::new(BTreeSet::new()),
                defect: Observable::new(None),
                listeners,
                trackers: RefCell::new(HashMap::new()),
                next_generation: Cell::new(1),
            }),
        })
    }

    /// Published messages keyed by registered path.
    #[must_use]
    pub fn errors(&self) -> &Observable<BTreeMap<String, String>> {
        &self.inner.errors
    }

    /// Paths whose validator is currently running.
    #[must_use]
    pub fn validating(&self) -> &Observable<BTreeSet<String>> {
        &self.inner.validating
    }

    /// The latest unreported validator defect, if any.
    #[must_use]
    pub fn defect(&self) -> &Observable<Option<ValidatorDefect>> {
        &self.inner.defect
    }

    /// Take the pending defect, clearing the signal.
    pub fn take_defect(&self) -> Option<ValidatorDefect> {
        let defect = self.inner.defect.get();
        if defect.is_some() {
            self.inner.defect.set(None);
        }
        defect
    }

    pub fn registered_paths(&self) -> impl Iterator<Item = &str> {
        self.inner.registrations.keys().map(String::as_str)
    }

    /// Scheduled or running validations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.trackers.borrow().len()
    }

    /// Reschedule every registered path related to `changed`.
    pub fn schedule_matching(&self, changed: &str) {
        let matches: Vec<String> = self
            .inner
            .registrations
            .keys()
            .filter(|key| related(changed, key))
            .cloned()
            .collect();
        for key in matches {
            self.schedule(&key);
        }
    }

    /// Schedule every registered path.
    pub fn validate_all(&self) {
        let keys: Vec<String> = self.inner.registrations.keys().cloned().collect();
        for key in keys {
            self.schedule(&key);
        }
    }

    /// (Re)arm the validator registered at `key`. Unregistered keys are
    /// ignored. Must be called inside a `LocalSet`.
    pub fn schedule(&self, key: &str) {
        if !self.inner.registrations.contains_key(key) {
            return;
        }
        self.cancel(key);
        if self.inner.clear_on_change {
            self.inner.errors.update(|errors| {
                errors.remove(key);
            });
        }

        let generation = self.inner.next_generation.get();
        self.inner.next_generation.set(generation + 1);
        let handle = CancelHandle::new();
        let task = tokio::task::spawn_local(run(
            Rc::downgrade(&self.inner),
            key.to_owned(),
            generation,
            handle.signal(),
            self.inner.debounce,
        ));
        tracing::trace!(path = key, generation, "async validation armed");
        self.inner.trackers.borrow_mut().insert(
            key.to_owned(),
            Tracker {
                generation,
                handle,
                task,
            },
        );
    }

    /// Cancel the run for `key`, if any. Its published error is kept.
    pub fn cancel(&self, key: &str) {
        let previous = self.inner.trackers.borrow_mut().remove(key);
        if let Some(tracker) = previous {
            tracker.stop();
            self.inner.validating.update(|paths| {
                paths.remove(key);
            });
        }
    }

    /// Cancel every run and clear all published errors.
    pub fn cancel_all(&self) {
        let trackers: Vec<Tracker> = self
            .inner
            .trackers
            .borrow_mut()
            .drain()
            .map(|(_, t)| t)
            .collect();
        if !trackers.is_empty() {
            tracing::debug!(count = trackers.len(), "async validations cancelled");
        }
        for tracker in trackers {
            tracker.stop();
        }
        self.inner.validating.set(BTreeSet::new());
        self.inner.errors.set(BTreeMap::new());
    }
}

/// Clears the tracker and validating flag when a run ends, however it ends,
/// unless a newer run has taken over the path.
struct RunGuard {
    inner: Weak<CoordinatorInner>,
    key: String,
    generation: u64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if !inner.is_current(&self.key, self.generation) {
            return;
        }
        inner.trackers.borrow_mut().remove(&self.key);
        inner.validating.update(|paths| {
            paths.remove(&self.key);
        });
    }
}

async fn run(
    weak: Weak<CoordinatorInner>,
    key: String,
    generation: u64,
    signal: CancelSignal,
    debounce: Duration,
) {
    tokio::time::sleep(debounce).await;
    if signal.is_cancelled() {
        return;
    }
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let _guard = RunGuard {
        inner: weak.clone(),
        key: key.clone(),
        generation,
    };
    let Some(registration) = inner.registrations.get(&key) else {
        return;
    };
    if inner
        .sync_errors
        .with(|tree| tree.has_error_at(&registration.path))
    {
        tracing::debug!(path = %key, "sync error present, async validation skipped");
        return;
    }

    inner.validating.update(|paths| {
        paths.insert(key.clone());
    });
    let value = inner.data.get(&key).unwrap_or_default();
    let root = inner.data.snapshot();
    let validator = Rc::clone(&registration.validator);
    drop(inner);

    let result = validator(value, root, signal.clone()).await;

    match result {
        Ok(message) => {
            if signal.is_cancelled() {
                return;
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if !inner.is_current(&key, generation) {
                return;
            }
            tracing::trace!(path = %key, valid = message.is_empty(), "async validation settled");
            inner.errors.update(|errors| {
                errors.insert(key.clone(), message);
            });
        }
        Err(AsyncValidationError::Cancelled) => {
            tracing::trace!(path = %key, "async validation cancelled");
        }
        Err(AsyncValidationError::Failed(_)) if signal.is_cancelled() => {
            tracing::trace!(path = %key, "cancelled async validation failed");
        }
        Err(AsyncValidationError::Failed(message)) => {
            tracing::error!(path = %key, error = %message, "async validator failed");
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let defect = ValidatorDefect {
                path: key,
                message,
                generation,
            };
            inner.defect.set(Some(defect.clone()));
            inner.listeners.emit(|l| l.on_validator_defect(&defect));
        }
    }
}
