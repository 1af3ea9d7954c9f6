#![forbid(unsafe_code)]

//! Engine behaviour switches.
//!
//! Every field defaults independently, so a policy file only needs to name
//! the switches it changes:
//!
//! ```
//! use fform_runtime::EngineOptions;
//!
//! let opts = EngineOptions::from_json_str(r#"{ "debounce_validation_ms": 50 }"#).unwrap();
//! assert_eq!(opts.debounce_validation_ms, 50);
//! assert_eq!(opts.async_debounce_ms, 300);
//! assert!(opts.reset_dirty_on_action);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Clear the dirty flag after a successful action.
    pub reset_dirty_on_action: bool,
    /// Sync validation debounce. `0` coalesces a burst into the next turn.
    pub debounce_validation_ms: u64,
    /// Let `execute` start while another action is still running.
    pub allow_concurrent_actions: bool,
    /// Keep a stored action error across subsequent edits.
    pub persist_action_error: bool,
    /// Per-path async validation debounce.
    pub async_debounce_ms: u64,
    /// Run every registered async validator once at construction.
    pub validate_async_on_init: bool,
    /// Drop a path's published async error as soon as it is rescheduled.
    pub clear_async_errors_on_change: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            reset_dirty_on_action: true,
            debounce_validation_ms: 0,
            allow_concurrent_actions: false,
            persist_action_error: false,
            async_debounce_ms: 300,
            validate_async_on_init: false,
            clear_async_errors_on_change: true,
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    #[cfg(feature = "policy-config")]
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    #[must_use]
    pub fn with_reset_dirty_on_action(mut self, on: bool) -> Self {
        self.reset_dirty_on_action = on;
        self
    }

    #[must_use]
    pub fn with_debounce_validation_ms(mut self, ms: u64) -> Self {
        self.debounce_validation_ms = ms;
        self
    }

    #[must_use]
    pub fn with_allow_concurrent_actions(mut self, on: bool) -> Self {
        self.allow_concurrent_actions = on;
        self
    }

    #[must_use]
    pub fn with_persist_action_error(mut self, on: bool) -> Self {
        self.persist_action_error = on;
        self
    }

    #[must_use]
    pub fn with_async_debounce_ms(mut self, ms: u64) -> Self {
        self.async_debounce_ms = ms;
        self
    }

    #[must_use]
    pub fn with_validate_async_on_init(mut self, on: bool) -> Self {
        self.validate_async_on_init = on;
        self
    }

    #[must_use]
    pub fn with_clear_async_errors_on_change(mut self, on: bool) -> Self {
        self.clear_async_errors_on_change = on;
        self
    }

    #[inline]
    #[must_use]
    pub fn validation_debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_validation_ms)
    }

    #[inline]
    #[must_use]
    pub fn async_debounce(&self) -> Duration {
        Duration::from_millis(self.async_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = EngineOptions::default();
        assert!(opts.reset_dirty_on_action);
        assert_eq!(opts.debounce_validation_ms, 0);
        assert!(!opts.allow_concurrent_actions);
        assert!(!opts.persist_action_error);
        assert_eq!(opts.async_debounce(), Duration::from_millis(300));
        assert!(!opts.validate_async_on_init);
        assert!(opts.clear_async_errors_on_change);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let opts =
            EngineOptions::from_json_str(r#"{ "allow_concurrent_actions": true }"#).unwrap();
        assert_eq!(
            opts,
            EngineOptions::default().with_allow_concurrent_actions(true)
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(EngineOptions::from_json_str("{ nope").is_err());
    }

    #[cfg(feature = "policy-config")]
    #[test]
    fn toml_policy() {
        let opts = EngineOptions::from_toml_str(
            "async_debounce_ms = 10\nclear_async_errors_on_change = false\n",
        )
        .unwrap();
        assert_eq!(opts.async_debounce_ms, 10);
        assert!(!opts.clear_async_errors_on_change);
        assert!(opts.reset_dirty_on_action);
    }
}
