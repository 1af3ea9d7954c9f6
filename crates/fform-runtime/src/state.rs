#![forbid(unsafe_code)]

//! Observable engine state.
//!
//! [`EngineSignals`] bundles one [`ReadOnly`] per state field for render
//! layers that subscribe; [`EngineState`] is a plain, serializable copy of
//! all of them at one instant.

use std::collections::{BTreeMap, BTreeSet};

use fform_core::ErrorTree;
use serde::Serialize;

use crate::action::ActionError;
use crate::async_validation::ValidatorDefect;
use crate::reactive::ReadOnly;
use crate::snapshot::Snapshot;

/// Push-style views of every engine state field.
///
/// The derived flags (`has_errors`, `has_async_errors`,
/// `has_combined_errors`) stay current only while the engine is alive.
#[derive(Debug, Clone)]
pub struct EngineSignals {
    pub dirty: ReadOnly<bool>,
    pub errors: ReadOnly<ErrorTree>,
    pub has_errors: ReadOnly<bool>,
    pub action_in_progress: ReadOnly<bool>,
    pub action_error: ReadOnly<Option<ActionError>>,
    pub snapshots: ReadOnly<Vec<Snapshot>>,
    pub async_errors: ReadOnly<BTreeMap<String, String>>,
    pub has_async_errors: ReadOnly<bool>,
    pub async_validating_paths: ReadOnly<BTreeSet<String>>,
    /// `has_errors || has_async_errors`.
    pub has_combined_errors: ReadOnly<bool>,
    /// Latest async validator defect not yet taken by the caller.
    pub validator_defect: ReadOnly<Option<ValidatorDefect>>,
}

impl EngineSignals {
    /// Copy every field's current value.
    #[must_use]
    pub fn current(&self) -> EngineState {
        EngineState {
            dirty: self.dirty.get(),
            errors: self.errors.get(),
            has_errors: self.has_errors.get(),
            action_in_progress: self.action_in_progress.get(),
            action_error: self.action_error.get().map(|e| e.to_string()),
            snapshots: self.snapshots.get(),
            async_errors: self.async_errors.get(),
            has_async_errors: self.has_async_errors.get(),
            async_validating_paths: self.async_validating_paths.get(),
            has_combined_errors: self.has_combined_errors.get(),
            validator_defect: self.validator_defect.get().map(|d| d.to_string()),
        }
    }
}

/// Point-in-time copy of the engine state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineState {
    pub dirty: bool,
    pub errors: ErrorTree,
    pub has_errors: bool,
    pub action_in_progress: bool,
    /// Display form of the stored action error.
    pub action_error: Option<String>,
    pub snapshots: Vec<Snapshot>,
    pub async_errors: BTreeMap<String, String>,
    pub has_async_errors: bool,
    pub async_validating_paths: BTreeSet<String>,
    pub has_combined_errors: bool,
    /// Display form of the pending validator defect.
    pub validator_defect: Option<String>,
}
