//! Custom error types for the plugin runtime.
//!
//! This module defines the primary error type, `MedlinkError`, shared by the
//! registry and orchestrator crates. Using the `thiserror` crate, it provides
//! a centralized and consistent way to handle the error taxonomy of the
//! runtime:
//!
//! - **`InvalidState`**: a host programming error such as initializing the
//!   registry twice. These are intentionally fatal to the operation and are
//!   never retried, since plugin instances are not re-creatable once the host
//!   context has been handed to them.
//! - **`UnknownPlugin`**: an activation or lookup referenced a plugin id that
//!   is not among the loaded factories. Surfaced as a `Result` failure to the
//!   caller; the host keeps running.
//! - **`Activation`/`Deactivation`**: a plugin lifecycle hook failed. The
//!   underlying hook error message is preserved for the user-facing report.
//! - **`Io`/`Json`**: persistence failures in the activation-preferences and
//!   credential stores.
//!
//! Transient poll/read failures are deliberately *not* modeled here: the
//! polling loops log them and proceed to their next scheduled iteration, so
//! they never cross a component boundary as typed errors.

use thiserror::Error;

/// Convenience alias for results using the runtime error type.
pub type AppResult<T> = std::result::Result<T, MedlinkError>;

/// Primary error type for the plugin runtime.
#[derive(Error, Debug)]
pub enum MedlinkError {
    /// A host programming error, e.g. double-initialize. Not recoverable at
    /// runtime; fix the calling code.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The requested plugin id is not among the loaded factories.
    #[error("unknown plugin id '{0}'")]
    UnknownPlugin(String),

    /// A plugin's activation hook failed.
    #[error("activation of plugin '{id}' failed: {message}")]
    Activation { id: String, message: String },

    /// A plugin's deactivation hook failed.
    #[error("deactivation of plugin '{id}' failed: {message}")]
    Deactivation { id: String, message: String },

    /// Loading the safety-limits snapshot from its backing store failed.
    #[error("failed to load safety limits: {0}")]
    SafetyLimits(String),

    /// The persisted activation-preferences store failed to read or write.
    #[error("activation-preferences store error: {0}")]
    Store(String),

    /// Filesystem failure in a persisted store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure in a persisted store.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MedlinkError {
    /// Shorthand for an [`MedlinkError::InvalidState`] with a formatted message.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}
