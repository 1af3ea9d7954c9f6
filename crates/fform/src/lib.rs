#![forbid(unsafe_code)]

//! FrankenForm public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use fform_core::{ErrorTree, FieldPath, Value};

#[cfg(feature = "runtime")]
pub use fform_runtime::{ActionError, ActionOutcome, Engine, EngineOptions, Tracked};

pub mod prelude {
    pub use fform_core as core;
    #[cfg(feature = "runtime")]
    pub use fform_runtime as runtime;

    pub use fform_core::{ErrorTree, FieldPath, Value};
    #[cfg(feature = "runtime")]
    pub use fform_runtime::{
        ActionError, ActionOutcome, AsyncValidationError, CancelSignal, EffectContext, Engine,
        EngineListener, EngineOptions, Field, Tracked, ValidatorDefect,
    };
}
