#![forbid(unsafe_code)]

//! Debounced synchronous validation.
//!
//! # Design
//!
//! The scheduler owns the optional validator and the published
//! [`ErrorTree`]. Every accepted change calls [`request`](ValidationScheduler::request);
//! the pass itself is deferred onto the current `LocalSet`:
//!
//! - debounce `0`: the first request spawns one local task and later
//!   requests see it pending and coalesce, so a synchronous burst of writes
//!   costs one validator call on the next turn.
//! - debounce `d > 0`: every request aborts the pending timer task and arms a
//!   fresh one, so only the last request of a burst fires.
//!
//! A pass validates the data as it is when the pass *runs*, not when it was
//! requested, and replaces the published tree wholesale.
//!
//! # Failure Modes
//!
//! - **No `LocalSet`**: `request` spawns with `tokio::task::spawn_local` and
//!   panics outside a `LocalSet`. `run_now` never spawns.
//! - **Scheduler dropped with a pass pending**: the task holds a `Weak` and
//!   is aborted on drop, so nothing runs.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use fform_core::{ErrorTree, Value};
use tokio::task::JoinHandle;
use web_time::Instant;

use crate::listener::Listeners;
use crate::observe::Tracked;
use crate::reactive::Observable;

/// Synchronous validator: data in, error tree out.
pub type SyncValidator = Rc<dyn Fn(&Value) -> ErrorTree>;

struct SchedulerInner {
    validator: Option<SyncValidator>,
    debounce: Duration,
    data: Tracked,
    errors: Observable<ErrorTree>,
    listeners: Listeners,
    pending: RefCell<Option<JoinHandle<()>>>,
    passes: Cell<u64>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(task) = self.pending.get_mut().take() {
            task.abort();
        }
    }
}

pub struct ValidationScheduler {
    inner: Rc<SchedulerInner>,
}

impl fmt::Debug for ValidationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationScheduler")
            .field("configured", &self.inner.validator.is_some())
            .field("debounce", &self.inner.debounce)
            .field("pending", &self.is_pending())
            .field("passes", &self.inner.passes.get())
            .finish()
    }
}

impl ValidationScheduler {
    #[must_use]
    pub fn new(
        validator: Option<SyncValidator>,
        debounce: Duration,
        data: Tracked,
        listeners: Listeners,
    ) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                validator,
                debounce,
                data,
                errors: Observable::new(ErrorTree::new()),
                listeners,
                pending: RefCell::new(None),
                passes: Cell::new(0),
            }),
        }
    }

    /// The published error tree.
    #[must_use]
    pub fn errors(&self) -> &Observable<ErrorTree> {
        &self.inner.errors
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.inner.validator.is_some()
    }

    /// Whether a pass is armed but has not run yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner
            .pending
            .borrow()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Number of validator invocations so far.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.inner.passes.get()
    }

    /// Ask for a pass. Must be called inside a `LocalSet`.
    pub fn request(&self) {
        if self.inner.validator.is_none() {
            return;
        }
        let debounce = self.inner.debounce;
        let mut pending = self.inner.pending.borrow_mut();
        if debounce.is_zero() {
            if pending.as_ref().is_some_and(|task| !task.is_finished()) {
                return;
            }
        } else if let Some(task) = pending.take() {
            task.abort();
        }

        let weak = Rc::downgrade(&self.inner);
        tracing::trace!(debounce_ms = debounce.as_millis() as u64, "validation pass armed");
        *pending = Some(tokio::task::spawn_local(async move {
            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
            }
            fire(&weak);
        }));
    }

    /// Drop any pending pass and validate immediately.
    pub fn run_now(&self) {
        if let Some(task) = self.inner.pending.borrow_mut().take() {
            task.abort();
        }
        run(&self.inner);
    }

    /// Drop any pending pass without running it.
    pub fn cancel(&self) {
        if let Some(task) = self.inner.pending.borrow_mut().take() {
            task.abort();
        }
    }
}

fn fire(weak: &Weak<SchedulerInner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    inner.pending.borrow_mut().take();
    run(&inner);
}

fn run(inner: &SchedulerInner) {
    let Some(validator) = inner.validator.as_ref() else {
        return;
    };
    let started = Instant::now();
    let source = inner.data.snapshot();
    let tree = validator(&source);
    inner.passes.set(inner.passes.get() + 1);
    tracing::trace!(
        pass = inner.passes.get(),
        errors = tree.error_count(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "validation pass"
    );
    inner.errors.set(tree.clone());
    inner.listeners.emit(|l| l.on_validate(&tree));
}
