use std::sync::atomic::AtomicU64;

/// Counters for one speaker instance, across all of its sessions.
#[derive(Debug, Default)]
pub struct SpeechMetrics {
    pub sessions_started: AtomicU64,
    pub segments_played: AtomicU64,
    pub segments_skipped: AtomicU64,
    pub sessions_cancelled: AtomicU64,
    pub split_failures: AtomicU64,
}
