//! Job status polling for BookVox.
//!
//! One [`JobPoller`] tracks one backend job at a time, fetching snapshots
//! from a [`StatusSource`] on a fixed interval and folding them into a
//! [`JobObservation`] that only ever moves forward: the phase tracks the
//! latest report, the transcript never regresses to empty or stale text,
//! and result payloads appear only with their terminal phase.

pub mod metrics;
pub mod mock;
pub mod poller;
pub mod source;
pub mod types;

pub use metrics::PollerMetrics;
pub use mock::MockStatusSource;
pub use poller::JobPoller;
pub use source::{StatusError, StatusSource};
pub use types::{
    JobId, JobObservation, JobPhase, JobResult, PollerConfig, StatusSnapshot,
    DEFAULT_POLL_INTERVAL,
};
