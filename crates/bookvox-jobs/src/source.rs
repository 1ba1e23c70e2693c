use async_trait::async_trait;
use thiserror::Error;

use crate::types::{JobId, StatusSnapshot};

/// Failure modes of a status fetch.
///
/// The poller treats both variants the same way: the current run halts and
/// the last observation stays visible. The split exists so callers and logs
/// can tell a dead backend from a garbled one.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed status payload: {0}")]
    Parse(String),
}

/// One-shot fetch of the current status snapshot for a job.
///
/// Implementations must be safe to call repeatedly for the same job; the
/// poller issues exactly one fetch at a time per instance.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn fetch_status(&self, job: &JobId) -> Result<StatusSnapshot, StatusError>;
}
