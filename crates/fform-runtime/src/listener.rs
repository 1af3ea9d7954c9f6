#![forbid(unsafe_code)]

//! Lifecycle listeners.
//!
//! An [`EngineListener`] is told about every lifecycle point of an engine:
//! construction, each accepted change, each published error tree, each
//! snapshot, both phases of an action, rollbacks, resets, async validator
//! defects and teardown. All
//! methods default to no-ops, so a listener only implements what it needs.
//!
//! Listeners run synchronously, in registration order, at the call site.
//! They must not assume any other listener has run.

use std::fmt;
use std::rc::Rc;

use fform_core::{ErrorTree, Value};

use crate::action::ActionError;
use crate::async_validation::ValidatorDefect;
use crate::observe::{Change, Tracked};
use crate::snapshot::Snapshot;

pub trait EngineListener {
    /// The engine finished construction.
    fn on_init(&self, _data: &Tracked) {}

    /// A write was accepted. Runs before the change's effect.
    fn on_change(&self, _data: &Tracked, _change: &Change) {}

    /// A sync validation pass published `errors`.
    fn on_validate(&self, _errors: &ErrorTree) {}

    /// A snapshot was captured (pushed or replaced in place).
    fn on_snapshot(&self, _snapshot: &Snapshot) {}

    fn on_action_start(&self, _params: &Value) {}

    /// The action settled; `error` is `None` on success.
    fn on_action_end(&self, _error: Option<&ActionError>) {}

    /// History rolled back to `target`.
    fn on_rollback(&self, _steps: usize, _target: &Snapshot) {}

    /// History reset to the baseline.
    fn on_reset(&self, _baseline: &Snapshot) {}

    /// An async validator failed without being cancelled. Nothing was
    /// published for its path.
    fn on_validator_defect(&self, _defect: &ValidatorDefect) {}

    /// The engine is being torn down. Fires once.
    fn on_destroy(&self) {}
}

/// Ordered listener list.
#[derive(Clone, Default)]
pub struct Listeners {
    items: Vec<Rc<dyn EngineListener>>,
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.items.len())
            .finish()
    }
}

impl Listeners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, listener: Rc<dyn EngineListener>) {
        self.items.push(listener);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Invoke `f` on every listener in registration order.
    pub fn emit(&self, f: impl Fn(&dyn EngineListener)) {
        for listener in &self.items {
            f(listener.as_ref());
        }
    }
}
