#![forbid(unsafe_code)]

//! Core: plain-data values, dotted field paths, and validation error trees.
//!
//! Nothing in this crate is time- or callback-driven; the reactive engine
//! lives in `fform-runtime`.

pub mod error;
pub mod error_tree;
pub mod path;
pub mod value;

pub use error::PathError;
pub use error_tree::ErrorTree;
pub use path::{FieldPath, Segment};
pub use value::{OpaqueRef, Slot, Value, ValueKind};
