#![forbid(unsafe_code)]

use fform_core::PathError;
use thiserror::Error;

use crate::async_validation::ValidatorDefect;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("path error: {0}")]
    Path(#[from] PathError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "policy-config")]
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("initial state must be an object, got {kind}")]
    InvalidRoot { kind: &'static str },

    #[error("invalid async validator registration for {path:?}: {message}")]
    InvalidRegistration { path: String, message: String },

    #[error(transparent)]
    ValidatorDefect(#[from] ValidatorDefect),
}

impl EngineError {
    #[must_use]
    pub fn registration(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRegistration {
            path: path.into(),
            message: message.into(),
        }
    }
}
