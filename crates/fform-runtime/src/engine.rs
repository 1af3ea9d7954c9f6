#![forbid(unsafe_code)]

//! The engine facade.
//!
//! An [`Engine`] owns the tracked data and wires every accepted change
//! through the same fan-out, synchronously and in this order:
//!
//! 1. mark dirty, and clear the stored action error unless
//!    [`EngineOptions::persist_action_error`] is set;
//! 2. `on_change` listeners;
//! 3. the effect, if any (writes made by the effect recurse through this
//!    same list before the outer write returns);
//! 4. request a sync validation pass;
//! 5. reschedule every async validator related to the changed path.
//!
//! An async validator that fails without being cancelled is a defect. The
//! engine keeps it on [`Engine::validator_defect`] and
//! [`EngineListener::on_validator_defect`] until the caller takes it with
//! [`Engine::check_validator_defect`].
//!
//! Validation passes and async validators run later on the current tokio
//! `LocalSet`, so engines must be driven from inside one:
//!
//! ```
//! use fform_core::{ErrorTree, Value};
//! use fform_runtime::Engine;
//! use serde_json::json;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
//! tokio::task::LocalSet::new().block_on(&rt, async {
//!     let engine = Engine::builder(Value::from(json!({ "name": "Ann" })))
//!         .validate(|data: &Value| {
//!             let long = data.as_object().and_then(|o| o.get("name")).and_then(Value::as_str)
//!                 .is_some_and(|n| n.len() > 5);
//!             ErrorTree::new().with("name", if long { "Max length 5" } else { "" })
//!         })
//!         .build()
//!         .unwrap();
//!     engine.data().set("name", "Csabacska").unwrap();
//!     assert!(engine.is_dirty());
//!     engine.validate_now();
//!     assert!(engine.has_errors());
//! });
//! ```

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use fform_core::{ErrorTree, Value};

use crate::action::{self, ActionError, ActionExecutor, ActionFn, ActionOutcome};
use crate::async_validation::{
    AsyncValidationCoordinator, AsyncValidationError, AsyncValidator, ValidatorDefect,
    async_validator,
};
use crate::cancel::CancelSignal;
use crate::error::{EngineError, Result};
use crate::listener::{EngineListener, Listeners};
use crate::observe::{Change, Tracked, observe};
use crate::options::EngineOptions;
use crate::reactive::{Derived, Observable};
use crate::snapshot::{Snapshot, SnapshotManager};
use crate::state::{EngineSignals, EngineState};
use crate::validation::{SyncValidator, ValidationScheduler};

/// Synchronous per-change hook.
pub type Effect = Rc<dyn Fn(&mut EffectContext<'_>)>;

/// Called once per settled action with its error, if any.
pub type DoneHook = Rc<dyn Fn(Option<&ActionError>)>;

/// What an effect sees for one accepted change.
pub struct EffectContext<'a> {
    engine: &'a EngineInner,
    data: &'a Tracked,
    change: &'a Change,
}

impl fmt::Debug for EffectContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectContext")
            .field("change", self.change)
            .finish_non_exhaustive()
    }
}

impl EffectContext<'_> {
    #[must_use]
    pub fn change(&self) -> &Change {
        self.change
    }

    /// Root handle of the tracked data. Writes through it are observed.
    #[must_use]
    pub fn data(&self) -> &Tracked {
        self.data
    }

    /// Capture the current data into the history.
    pub fn snapshot(&mut self, title: &str, replace: bool) {
        self.engine.take_snapshot(title, replace);
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Collects the callables and options for an [`Engine`].
pub struct EngineBuilder {
    initial: Value,
    validator: Option<SyncValidator>,
    effect: Option<Effect>,
    action: Option<ActionFn>,
    on_done: Option<DoneHook>,
    async_validators: Vec<(String, AsyncValidator)>,
    options: EngineOptions,
    listeners: Listeners,
}

impl fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("initial", &self.initial)
            .field("validator", &self.validator.is_some())
            .field("effect", &self.effect.is_some())
            .field("action", &self.action.is_some())
            .field(
                "async_validators",
                &self.async_validators.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .field("options", &self.options)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl EngineBuilder {
    #[must_use]
    pub fn validate(mut self, validator: impl Fn(&Value) -> ErrorTree + 'static) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    #[must_use]
    pub fn effect(mut self, effect: impl Fn(&mut EffectContext<'_>) + 'static) -> Self {
        self.effect = Some(Rc::new(effect));
        self
    }

    #[must_use]
    pub fn action<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Tracked, Value) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<(), ActionError>> + 'static,
    {
        self.action = Some(action::action(f));
        self
    }

    #[must_use]
    pub fn on_done(mut self, hook: impl Fn(Option<&ActionError>) + 'static) -> Self {
        self.on_done = Some(Rc::new(hook));
        self
    }

    /// Register an async validator for the field at `path`.
    #[must_use]
    pub fn async_validator<F, Fut>(mut self, path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, Value, CancelSignal) -> Fut + 'static,
        Fut: Future<Output = std::result::Result<String, AsyncValidationError>> + 'static,
    {
        self.async_validators.push((path.into(), async_validator(f)));
        self
    }

    #[must_use]
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: impl EngineListener + 'static) -> Self {
        self.listeners.push(Rc::new(listener));
        self
    }

    /// Build the engine and run the initial sync validation pass.
    ///
    /// Needs a `LocalSet` only when `validate_async_on_init` is set.
    pub fn build(self) -> Result<Engine> {
        let Self {
            initial,
            validator,
            effect,
            action,
            on_done,
            async_validators,
            options,
            listeners,
        } = self;

        if !matches!(initial, Value::Object(_)) {
            return Err(EngineError::InvalidRoot {
                kind: initial.kind().name(),
            });
        }

        let slot: Rc<OnceCell<Weak<EngineInner>>> = Rc::new(OnceCell::new());
        let hook = Rc::clone(&slot);
        let data = observe(initial, move |root, change| {
            if let Some(inner) = hook.get().and_then(Weak::upgrade) {
                inner.handle_change(root, change);
            }
        });

        let validation = ValidationScheduler::new(
            validator,
            options.validation_debounce(),
            data.clone(),
            listeners.clone(),
        );
        let async_validation = AsyncValidationCoordinator::new(
            async_validators,
            options.async_debounce(),
            options.clear_async_errors_on_change,
            data.clone(),
            validation.errors().clone(),
            listeners.clone(),
        )?;
        let actions = ActionExecutor::new(action, options.allow_concurrent_actions);

        let has_errors = Derived::from_observable(validation.errors(), ErrorTree::has_errors);
        let has_async_errors = Derived::from_observable(async_validation.errors(), |errors| {
            errors.values().any(|message| !message.is_empty())
        });
        let has_combined_errors = Derived::from2(
            has_errors.output(),
            has_async_errors.output(),
            |sync, async_| *sync || *async_,
        );

        let history = SnapshotManager::new(data.snapshot());
        let snapshots = Observable::new(history.entries().to_vec());

        let inner = Rc::new(EngineInner {
            data,
            options,
            effect,
            on_done,
            listeners,
            validation,
            async_validation,
            actions,
            history: RefCell::new(history),
            dirty: Observable::new(false),
            snapshots,
            has_errors,
            has_async_errors,
            has_combined_errors,
            destroyed: Cell::new(false),
        });
        // A fresh OnceCell is always empty.
        let _ = slot.set(Rc::downgrade(&inner));

        inner.validation.run_now();
        if inner.options.validate_async_on_init {
            inner.async_validation.validate_all();
        }
        tracing::debug!(
            async_paths = inner.async_validation.registered_paths().count(),
            listeners = inner.listeners.len(),
            "engine initialized"
        );
        inner.listeners.emit(|l| l.on_init(&inner.data));
        Ok(Engine { inner })
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

struct EngineInner {
    data: Tracked,
    options: EngineOptions,
    effect: Option<Effect>,
    on_done: Option<DoneHook>,
    listeners: Listeners,
    validation: ValidationScheduler,
    async_validation: AsyncValidationCoordinator,
    actions: ActionExecutor,
    history: RefCell<SnapshotManager>,
    dirty: Observable<bool>,
    snapshots: Observable<Vec<Snapshot>>,
    has_errors: Derived<bool>,
    has_async_errors: Derived<bool>,
    has_combined_errors: Derived<bool>,
    destroyed: Cell<bool>,
}

impl EngineInner {
    fn handle_change(&self, root: &Tracked, change: &Change) {
        if self.destroyed.get() {
            return;
        }
        self.dirty.set(true);
        if !self.options.persist_action_error {
            self.actions.clear_error();
        }
        self.listeners.emit(|l| l.on_change(root, change));
        if let Some(effect) = &self.effect {
            let mut cx = EffectContext {
                engine: self,
                data: root,
                change,
            };
            effect(&mut cx);
        }
        self.validation.request();
        self.async_validation.schedule_matching(&change.path);
    }

    fn take_snapshot(&self, title: &str, replace: bool) {
        let data = self.data.snapshot();
        let snapshot = self.history.borrow_mut().push(title, data, replace).clone();
        self.publish_history();
        tracing::trace!(title, "snapshot captured");
        self.listeners.emit(|l| l.on_snapshot(&snapshot));
    }

    fn publish_history(&self) {
        let entries = self.history.borrow().entries().to_vec();
        self.snapshots.set(entries);
    }

    /// Silent in-place restore, then async cancel and sync revalidation.
    fn restore(&self, data: &Value) {
        self.data.restore_silently(data);
        self.async_validation.cancel_all();
        self.validation.run_now();
    }

    fn rollback(&self, steps: usize) -> bool {
        let target = self.history.borrow_mut().rollback_target(steps);
        let Some((index, data)) = target else {
            tracing::debug!(steps, "rollback with only the baseline, ignored");
            return false;
        };
        self.restore(&data);
        if index == 0 {
            self.dirty.set(false);
        }
        self.publish_history();
        let landed = self.history.borrow().latest().clone();
        tracing::debug!(steps, index, title = %landed.title, "rolled back");
        self.listeners.emit(|l| l.on_rollback(steps, &landed));
        true
    }

    fn reset(&self) {
        let data = self.history.borrow_mut().reset_target();
        self.restore(&data);
        self.dirty.set(false);
        self.publish_history();
        let baseline = self.history.borrow().baseline().clone();
        tracing::debug!("reset to baseline");
        self.listeners.emit(|l| l.on_reset(&baseline));
    }

    fn teardown(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.validation.cancel();
        self.async_validation.cancel_all();
        tracing::debug!("engine destroyed");
        self.listeners.emit(|l| l.on_destroy());
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Reactive form state: tracked data, validation, history, and the submit
/// action.
///
/// Cloning yields another handle to the same engine; teardown happens on
/// [`destroy`](Self::destroy) or when the last handle is dropped.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("data", &self.inner.data)
            .field("dirty", &self.inner.dirty.get())
            .field("snapshots", &self.inner.history.borrow().len())
            .field("validation", &self.inner.validation)
            .field("async_validation", &self.inner.async_validation)
            .field("actions", &self.inner.actions)
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn builder(initial: impl Into<Value>) -> EngineBuilder {
        EngineBuilder {
            initial: initial.into(),
            validator: None,
            effect: None,
            action: None,
            on_done: None,
            async_validators: Vec::new(),
            options: EngineOptions::default(),
            listeners: Listeners::new(),
        }
    }

    /// An engine with no callables and default options.
    pub fn new(initial: impl Into<Value>) -> Result<Self> {
        Self::builder(initial).build()
    }

    /// Root handle of the tracked data.
    #[must_use]
    pub fn data(&self) -> Tracked {
        self.inner.data.clone()
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    #[must_use]
    pub fn signals(&self) -> EngineSignals {
        let inner = &self.inner;
        EngineSignals {
            dirty: inner.dirty.read_only(),
            errors: inner.validation.errors().read_only(),
            has_errors: inner.has_errors.read_only(),
            action_in_progress: inner.actions.in_progress().read_only(),
            action_error: inner.actions.error().read_only(),
            snapshots: inner.snapshots.read_only(),
            async_errors: inner.async_validation.errors().read_only(),
            has_async_errors: inner.has_async_errors.read_only(),
            async_validating_paths: inner.async_validation.validating().read_only(),
            has_combined_errors: inner.has_combined_errors.read_only(),
            validator_defect: inner.async_validation.defect().read_only(),
        }
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        self.signals().current()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    #[must_use]
    pub fn errors(&self) -> ErrorTree {
        self.inner.validation.errors().get()
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.inner.has_errors.get()
    }

    #[must_use]
    pub fn action_in_progress(&self) -> bool {
        self.inner.actions.in_progress().get()
    }

    #[must_use]
    pub fn action_error(&self) -> Option<ActionError> {
        self.inner.actions.error().get()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.inner.snapshots.get()
    }

    #[must_use]
    pub fn async_errors(&self) -> BTreeMap<String, String> {
        self.inner.async_validation.errors().get()
    }

    #[must_use]
    pub fn has_async_errors(&self) -> bool {
        self.inner.has_async_errors.get()
    }

    #[must_use]
    pub fn async_validating_paths(&self) -> BTreeSet<String> {
        self.inner.async_validation.validating().get()
    }

    #[must_use]
    pub fn has_combined_errors(&self) -> bool {
        self.inner.has_combined_errors.get()
    }

    /// Run the action with `params`.
    ///
    /// Returns [`ActionOutcome::Ignored`] without side effects when no action
    /// is configured or one is already running and concurrency is off.
    pub async fn execute(&self, params: impl Into<Value>) -> ActionOutcome {
        let inner = &self.inner;
        let Some(run) = inner.actions.begin() else {
            return ActionOutcome::Ignored;
        };
        let params = params.into();
        inner.listeners.emit(|l| l.on_action_start(&params));

        let result = run.invoke(inner.data.clone(), params).await;

        if result.is_ok() {
            if inner.options.reset_dirty_on_action {
                inner.dirty.set(false);
            }
            let data = inner.data.snapshot();
            inner.history.borrow_mut().rebase(data);
            inner.publish_history();
        }
        if let Some(on_done) = &inner.on_done {
            on_done(result.as_ref().err());
        }
        let outcome = run.finish(&result);
        inner.listeners.emit(|l| l.on_action_end(result.as_ref().err()));
        outcome
    }

    /// Capture the current data into the history. With `replace`, a last
    /// entry of the same title is overwritten.
    pub fn snapshot(&self, title: &str, replace: bool) {
        self.inner.take_snapshot(title, replace);
    }

    /// Step back `steps` snapshots (clamped at the baseline). Returns
    /// `false` when only the baseline exists.
    pub fn rollback(&self, steps: usize) -> bool {
        self.inner.rollback(steps)
    }

    /// Restore the baseline and drop every later snapshot.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Run the sync validator now, dropping any pending pass.
    pub fn validate_now(&self) {
        self.inner.validation.run_now();
    }

    /// Latest async validator defect not yet taken.
    #[must_use]
    pub fn validator_defect(&self) -> Option<ValidatorDefect> {
        self.inner.async_validation.defect().get()
    }

    /// Surface a pending async validator defect as an error, clearing it.
    pub fn check_validator_defect(&self) -> Result<()> {
        match self.inner.async_validation.take_defect() {
            Some(defect) => Err(defect.into()),
            None => Ok(()),
        }
    }

    /// Number of async validations scheduled or running.
    #[must_use]
    pub fn pending_async_validations(&self) -> usize {
        self.inner.async_validation.pending_count()
    }

    /// Cancel all pending work and fire `on_destroy`. Later changes are no
    /// longer orchestrated. Idempotent.
    pub fn destroy(&self) {
        self.inner.teardown();
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }
}
