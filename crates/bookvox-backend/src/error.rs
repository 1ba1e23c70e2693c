//! Error types for backend communication.

use thiserror::Error;

/// Backend client errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned {code}: {body}")]
    Api { code: u16, body: String },

    /// The requested artifact does not exist yet. Polling callers treat
    /// this as "try again later".
    #[error("Resource not ready")]
    NotReady,

    #[error("Parse error: {0}")]
    Parse(String),
}
