#![forbid(unsafe_code)]

//! Dotted field paths.
//!
//! A [`FieldPath`] addresses a field at any depth of a [`Value`](crate::Value)
//! tree. The textual form joins segments with `.`; all-digit segments parse
//! as array indices.
//!
//! # Reported paths
//!
//! Change notifications do not carry the full path. [`FieldPath::reported`]
//! drops every index segment, so a write to `items.2.name` is reported as
//! `items.name` and a write to `items.2` as `items`. Validators and effects
//! downstream key off the reported form, so this collapsing is kept as-is
//! even though it loses which element changed.

use std::fmt;
use std::str::FromStr;

use crate::error::PathError;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Object key.
    Key(String),
    /// Array index (also used to look up all-digit object keys).
    Index(usize),
}

impl Segment {
    /// Classify a raw segment: all-digit text is an index.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = raw.parse::<usize>() {
                return Self::Index(index);
            }
        }
        Self::Key(raw.to_owned())
    }

    /// The segment as an object key.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Key(k) => k.clone(),
            Self::Index(i) => i.to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => f.write_str(k),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A parsed dotted path. The empty path addresses the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    /// The root path (no segments).
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a dotted path. `""` is the root; empty segments (`"a..b"`,
    /// a leading or trailing dot) are rejected.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                return Err(PathError::invalid(raw));
            }
            segments.push(Segment::parse(part));
        }
        Ok(Self { segments })
    }

    /// Build a path from already-classified segments.
    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Path with one more segment appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Concatenate `other` onto `self`.
    #[must_use]
    pub fn join(&self, other: &FieldPath) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    /// Path without its last segment; `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// The notification form of this path: keys only, indices elided.
    #[must_use]
    pub fn reported(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            if let Segment::Key(k) = segment {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
        }
        out
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Whether a change at `changed` concerns the field registered at
/// `registered`: the two are equal, or one is a dotted ancestor of the other.
#[must_use]
pub fn related(changed: &str, registered: &str) -> bool {
    changed == registered || is_ancestor(changed, registered) || is_ancestor(registered, changed)
}

fn is_ancestor(ancestor: &str, descendant: &str) -> bool {
    descendant.len() > ancestor.len()
        && descendant.starts_with(ancestor)
        && descendant.as_bytes()[ancestor.len()] == b'.'
}
