//! HTTP backend client.
//!
//! Thin typed wrapper over the voice-to-book server's REST API. The
//! client implements the `StatusSource` seam of `bookvox-jobs` and the
//! `SpeechBackend` seam of `bookvox-speech`, so the engines never see
//! HTTP.

pub mod client;
pub mod error;
pub mod types;

pub use client::BackendClient;
pub use error::BackendError;
pub use types::{BookGuess, SplitResponse, SubmitReceipt};
