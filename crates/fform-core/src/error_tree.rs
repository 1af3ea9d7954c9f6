#![forbid(unsafe_code)]

//! Structured synchronous validation results.
//!
//! An [`ErrorTree`] mirrors the shape of the validated data: each key maps
//! either to a message ([`ErrorTree::Leaf`]) or to a nested tree. An empty
//! message means "no error here", so a tree full of empty leaves is clean.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::path::{FieldPath, Segment};

/// Recursive field-key → message mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorTree {
    Leaf(String),
    Node(BTreeMap<String, ErrorTree>),
}

impl Default for ErrorTree {
    fn default() -> Self {
        Self::Node(BTreeMap::new())
    }
}

impl ErrorTree {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn leaf(message: impl Into<String>) -> Self {
        Self::Leaf(message.into())
    }

    /// Whether any leaf anywhere holds a non-empty message.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        match self {
            Self::Leaf(message) => !message.is_empty(),
            Self::Node(children) => children.values().any(Self::has_errors),
        }
    }

    /// Subtree at `path`. Index segments are looked up by their decimal key.
    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&ErrorTree> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| match node {
                Self::Node(children) => children.get(&segment.key()),
                Self::Leaf(_) => None,
            })
    }

    /// Message stored at `path`, if the path ends on a leaf.
    #[must_use]
    pub fn message_at(&self, path: &FieldPath) -> Option<&str> {
        match self.get(path)? {
            Self::Leaf(message) => Some(message),
            Self::Node(_) => None,
        }
    }

    /// Whether the field at `path` is in error: a non-empty leaf, or a
    /// subtree that contains one.
    #[must_use]
    pub fn has_error_at(&self, path: &FieldPath) -> bool {
        self.get(path).is_some_and(Self::has_errors)
    }

    /// Store `message` at `path`, creating intermediate nodes. A leaf in the
    /// way is replaced by a node. Inserting at the root replaces the tree.
    pub fn insert(&mut self, path: &FieldPath, message: impl Into<String>) {
        let tree = std::mem::take(self);
        *self = tree.inserted(path.segments(), message.into());
    }

    /// Builder form of [`insert`](Self::insert) taking a dotted path.
    /// An unparseable path is ignored.
    #[must_use]
    pub fn with(mut self, path: &str, message: impl Into<String>) -> Self {
        if let Ok(path) = FieldPath::parse(path) {
            self.insert(&path, message);
        }
        self
    }

    /// Number of leaves holding a non-empty message.
    #[must_use]
    pub fn error_count(&self) -> usize {
        match self {
            Self::Leaf(message) => usize::from(!message.is_empty()),
            Self::Node(children) => children.values().map(Self::error_count).sum(),
        }
    }

    fn inserted(self, segments: &[Segment], message: String) -> Self {
        let Some((first, rest)) = segments.split_first() else {
            return Self::Leaf(message);
        };
        let mut children = match self {
            Self::Node(children) => children,
            Self::Leaf(_) => BTreeMap::new(),
        };
        let key = first.key();
        let child = children.remove(&key).unwrap_or_default();
        children.insert(key, child.inserted(rest, message));
        Self::Node(children)
    }
}
