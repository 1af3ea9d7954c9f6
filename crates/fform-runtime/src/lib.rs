#![forbid(unsafe_code)]

//! FrankenForm runtime: change tracking and orchestration.
//!
//! # Role in FrankenForm
//! `fform-runtime` turns a plain [`Value`](fform_core::Value) tree into a
//! reactive form engine. Writes go through a [`Tracked`] handle and fan out
//! to a debounced sync validator, per-path async validators, a snapshot
//! history, and a single-flight submit action. Everything observable is
//! exposed as [`ReadOnly`] signals.
//!
//! # Runtime model
//! The engine is single-threaded (`Rc`, not `Arc`). Deferred work runs as
//! `tokio::task::spawn_local` tasks, so an engine must be used inside a
//! `tokio::task::LocalSet`.

pub mod action;
pub mod async_validation;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod listener;
pub mod observe;
pub mod options;
pub mod reactive;
pub mod snapshot;
pub mod state;
pub mod validation;

pub use action::{ActionError, ActionOutcome};
pub use async_validation::{
    AsyncValidationError, AsyncValidator, ValidatorDefect, Verdict, async_validator,
};
pub use cancel::{CancelHandle, CancelSignal};
pub use engine::{EffectContext, Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use listener::EngineListener;
pub use observe::{Change, Field, Tracked, observe};
pub use options::EngineOptions;
pub use reactive::{Derived, Observable, ReadOnly, Subscription};
pub use snapshot::{BASELINE_TITLE, Snapshot, SnapshotManager};
pub use state::{EngineSignals, EngineState};
