//! Guide registry errors.
//!
//! Most registry failures are reported as data (`success: false` results).
//! The types here cover the remaining paths that return `Result`.

use thiserror::Error;

/// Errors returned by the few fallible registry and bridge operations.
#[derive(Debug, Error)]
pub enum GuideError {
    /// YAML parsing failed while loading configuration.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A flag path string could not be parsed.
    #[error("Invalid flag path: {0}")]
    InvalidFlagPath(String),

    /// A state patch was not a JSON object.
    #[error("Invalid state for module \"{module}\": {reason}")]
    InvalidState { module: String, reason: String },

    /// Element discovery was requested but no element source is attached.
    #[error("No element source attached")]
    NoElementSource,

    /// The element source failed while scanning.
    #[error("Element source error: {0}")]
    ElementSource(String),

    /// A controller command could not be decoded.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Error returned by action and query implementations.
///
/// The registry surfaces the display string as the `error` field of the
/// invocation result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The caller supplied input the action cannot work with.
    #[error("{0}")]
    InvalidInput(String),

    /// The action ran and failed.
    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    /// Shorthand for [`ActionError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Shorthand for [`ActionError::InvalidInput`].
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Convenience alias for registry results.
pub type GuideResult<T> = Result<T, GuideError>;

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> Option<String> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        Some((*s).to_string())
    } else {
        payload.downcast_ref::<String>().cloned()
    }
}
