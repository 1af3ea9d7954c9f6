#![forbid(unsafe_code)]

//! Named state captures with rollback and reset.
//!
//! [`SnapshotManager`] only keeps the history. Restoring the live data,
//! cancelling async work and revalidating are the engine's job; the manager
//! hands back the data to restore.
//!
//! # Invariants
//!
//! 1. The history is never empty; index 0 is the baseline.
//! 2. After `rollback_target(steps)` the history ends at the returned index.
//! 3. After `reset_target()` the history holds exactly the baseline.

use fform_core::Value;
use serde::Serialize;

/// Title given to the baseline entry.
pub const BASELINE_TITLE: &str = "Initial";

/// One named, deep-cloned capture of the state root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub title: String,
    pub data: Value,
}

impl Snapshot {
    #[must_use]
    pub fn new(title: impl Into<String>, data: Value) -> Self {
        Self {
            title: title.into(),
            data,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotManager {
    entries: Vec<Snapshot>,
}

impl SnapshotManager {
    /// Start a history whose baseline is `data`.
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            entries: vec![Snapshot::new(BASELINE_TITLE, data)],
        }
    }

    /// Record `data` under `title`. With `replace`, a last entry carrying the
    /// same title is overwritten in place instead of appended to.
    ///
    /// Returns the stored entry.
    pub fn push(&mut self, title: &str, data: Value, replace: bool) -> &Snapshot {
        let snapshot = Snapshot::new(title, data);
        match self.entries.last_mut() {
            Some(last) if replace && last.title == title => *last = snapshot,
            _ => self.entries.push(snapshot),
        }
        let last = self.entries.len() - 1;
        &self.entries[last]
    }

    /// Move back `steps` entries (clamped at the baseline) and truncate the
    /// history there. Returns the target index and the data to restore, or
    /// `None` when only the baseline exists.
    pub fn rollback_target(&mut self, steps: usize) -> Option<(usize, Value)> {
        if self.entries.len() <= 1 {
            return None;
        }
        let index = (self.entries.len() - 1).saturating_sub(steps);
        self.entries.truncate(index + 1);
        Some((index, self.entries[index].data.clone()))
    }

    /// Truncate to the baseline and return its data.
    pub fn reset_target(&mut self) -> Value {
        self.entries.truncate(1);
        self.baseline().data.clone()
    }

    /// Replace the whole history with a fresh baseline.
    pub fn rebase(&mut self, data: Value) {
        self.entries.clear();
        self.entries.push(Snapshot::new(BASELINE_TITLE, data));
    }

    #[must_use]
    pub fn baseline(&self) -> &Snapshot {
        &self.entries[0]
    }

    #[must_use]
    pub fn latest(&self) -> &Snapshot {
        &self.entries[self.entries.len() - 1]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[Snapshot] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(m: &SnapshotManager) -> Vec<&str> {
        m.entries().iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn starts_with_baseline() {
        let m = SnapshotManager::new(Value::from(1));
        assert_eq!(titles(&m), vec!["Initial"]);
        assert_eq!(m.latest().data, Value::from(1));
    }

    #[test]
    fn replace_overwrites_same_title_only() {
        let mut m = SnapshotManager::new(Value::from(0));
        m.push("typing", Value::from(1), true);
        m.push("typing", Value::from(2), true);
        assert_eq!(titles(&m), vec!["Initial", "typing"]);
        assert_eq!(m.latest().data, Value::from(2));

        m.push("typing", Value::from(3), false);
        m.push("other", Value::from(4), true);
        assert_eq!(titles(&m), vec!["Initial", "typing", "typing", "other"]);
    }

    #[test]
    fn rollback_with_only_baseline_is_noop() {
        let mut m = SnapshotManager::new(Value::from(0));
        assert_eq!(m.rollback_target(1), None);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn rollback_truncates_to_target() {
        let mut m = SnapshotManager::new(Value::from(0));
        for i in 1..=3 {
            m.push(&format!("s{i}"), Value::from(i), false);
        }
        assert_eq!(m.rollback_target(1), Some((2, Value::from(2))));
        assert_eq!(m.len(), 3);
        assert_eq!(m.rollback_target(10), Some((0, Value::from(0))));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn rollback_zero_steps_keeps_latest() {
        let mut m = SnapshotManager::new(Value::from(0));
        m.push("a", Value::from(1), false);
        assert_eq!(m.rollback_target(0), Some((1, Value::from(1))));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn reset_and_rebase() {
        let mut m = SnapshotManager::new(Value::from(0));
        m.push("a", Value::from(1), false);
        assert_eq!(m.reset_target(), Value::from(0));
        assert_eq!(m.len(), 1);
        m.push("b", Value::from(2), false);
        m.rebase(Value::from(9));
        assert_eq!(titles(&m), vec!["Initial"]);
        assert_eq!(m.baseline().data, Value::from(9));
    }
}
