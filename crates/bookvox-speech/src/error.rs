//! Error types for speech playback.

use thiserror::Error;

/// Speech pipeline error types.
#[derive(Error, Debug)]
pub enum SpeechError {
    /// Sentence splitting failed; the whole session is abandoned.
    #[error("sentence splitting failed: {0}")]
    Split(String),

    /// Synthesis of one sentence failed; that sentence gets skipped.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// The audio output could not be driven.
    #[error("audio output error: {0}")]
    Output(String),

    /// IO error (process spawning, pipe writes, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for speech operations.
pub type SpeechResult<T> = Result<T, SpeechError>;
