use std::sync::atomic::AtomicU64;

/// Counters for one poller instance.
///
/// Shared via `Arc`; every counter only ever increases over the poller's
/// lifetime, across runs and job switches.
#[derive(Debug, Default)]
pub struct PollerMetrics {
    /// Status requests issued, successful or not.
    pub polls_issued: AtomicU64,
    /// Snapshots folded into the observation.
    pub snapshots_applied: AtomicU64,
    /// Snapshots that changed the visible transcript.
    pub transcript_updates: AtomicU64,
    /// Runs that stopped because the job settled.
    pub runs_completed: AtomicU64,
    /// Runs that stopped on a fetch or decode failure.
    pub runs_halted: AtomicU64,
}
