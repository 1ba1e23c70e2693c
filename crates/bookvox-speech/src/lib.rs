//! Sentence-split playback for BookVox.
//!
//! This crate provides the playback pipeline: a [`Speaker`] splits text
//! into sentences through a [`SpeechBackend`], keeps a small prefetch
//! buffer of synthesized clips, and drives an [`AudioSink`] so segments
//! come out strictly in order with no audible gap between them.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod backend;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod sink;
pub mod speaker;
pub mod types;

pub use backend::SpeechBackend;
pub use error::{SpeechError, SpeechResult};
pub use metrics::SpeechMetrics;
pub use mock::{MockSpeechBackend, PrefetchGauge, RecordingSink};
pub use sink::AudioSink;
pub use speaker::Speaker;
pub use types::{
    AudioClip, SessionOutcome, SessionPhase, SpeakerEvent, SpeechConfig, DEFAULT_PREFETCH_DEPTH,
};

/// Generates unique playback session ids.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique session id.
pub fn next_session_id() -> u64 {
    SESSION_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}
