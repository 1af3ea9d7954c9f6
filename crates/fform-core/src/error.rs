use thiserror::Error;

/// Errors raised while parsing or walking a [`FieldPath`](crate::FieldPath).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid field path: {path:?}")]
    InvalidPath { path: String },

    #[error("no field at path: {path}")]
    NotFound { path: String },

    #[error("cannot descend into {kind} at path: {path}")]
    NotAContainer { path: String, kind: &'static str },

    #[error("array index {index} out of bounds at path: {path} (length {length})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        length: usize,
    },

    #[error("writes must target a field, not the root")]
    RootWrite,
}

impl PathError {
    #[must_use]
    pub fn invalid(path: impl Into<String>) -> Self {
        Self::InvalidPath { path: path.into() }
    }

    #[must_use]
    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }
}
