use std::fmt;

/// Opaque synthesized audio for one sentence.
///
/// The pipeline never looks inside; bytes go to the sink exactly as the
/// backend produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for AudioClip {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Tuning for a [`Speaker`](crate::speaker::Speaker).
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// How many sentences may sit synthesized-but-unplayed ahead of
    /// playback. Values below 1 are clamped to 1.
    pub prefetch_depth: usize,
}

pub const DEFAULT_PREFETCH_DEPTH: usize = 3;

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
        }
    }
}

/// Where a playback session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the sentence list.
    Splitting,
    /// Filling the prefetch buffer; nothing audible yet.
    Buffering,
    /// A clip is (or is about to be) audible.
    Playing,
    /// The session is over, whatever the outcome.
    Ended,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Ended)
    }
}

/// How a playback session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every segment was played or skipped.
    Completed,
    /// Cancelled by the consumer or replaced by a newer session.
    Cancelled,
    /// The sentence split failed, so nothing was ever played.
    SplitFailed(String),
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Completed => f.write_str("completed"),
            SessionOutcome::Cancelled => f.write_str("cancelled"),
            SessionOutcome::SplitFailed(reason) => write!(f, "split failed: {reason}"),
        }
    }
}

/// Progress notifications from a playback session.
///
/// Per session, consumers see `SessionStarted` at most once, then segment
/// events, then exactly one `SessionEnded`. A session that dies during the
/// split emits only `SessionEnded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakerEvent {
    SessionStarted { session_id: u64, segments: usize },
    SegmentStarted { session_id: u64, index: usize },
    SegmentSkipped { session_id: u64, index: usize },
    SessionEnded { session_id: u64, outcome: SessionOutcome },
}
