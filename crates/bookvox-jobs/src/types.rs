use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of a background job on the conversion backend.
///
/// The backend routes ids case-insensitively and echoes them back with
/// whatever casing the submitter used, so ids are normalized to lower-case
/// at construction. An empty id cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Returns `None` when `raw` is empty or whitespace-only.
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_lowercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        JobId::new(&raw).ok_or_else(|| serde::de::Error::custom("job id must not be empty"))
    }
}

/// Discrete stage of a backend job, in rough pipeline order.
///
/// `Guessed`, `ConvertedBook`, and `Failed` settle the job: once one of them
/// is observed, no further polling happens until the consumer explicitly
/// restarts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Idle,
    Processing,
    DownloadingList,
    DownloadedList,
    DownloadingBook,
    DownloadedBook,
    ConvertingBook,
    ConvertedBook,
    Guessed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobPhase::Guessed | JobPhase::ConvertedBook | JobPhase::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobPhase::Idle => "idle",
            JobPhase::Processing => "processing",
            JobPhase::DownloadingList => "downloading_list",
            JobPhase::DownloadedList => "downloaded_list",
            JobPhase::DownloadingBook => "downloading_book",
            JobPhase::DownloadedBook => "downloaded_book",
            JobPhase::ConvertingBook => "converting_book",
            JobPhase::ConvertedBook => "converted_book",
            JobPhase::Guessed => "guessed",
            JobPhase::Failed => "failed",
        }
    }
}

impl Default for JobPhase {
    fn default() -> Self {
        JobPhase::Idle
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One raw record from the status endpoint.
///
/// Every field is optional: the backend only reports what it currently
/// knows. An absent field means "no update this cycle", never "reset".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<JobPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guess: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebook_path: Option<String>,
}

/// Payload attached to the observation once a run settles with something to
/// show for it.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Opaque identification payload from the guessing stage.
    Guess(serde_json::Value),
    /// Locator of the converted ebook artifact.
    Ebook(String),
}

/// Externally visible state of the tracked job.
///
/// Folded from raw snapshots: the phase tracks the most recent report, the
/// transcript only ever moves to a new non-empty value, and the result only
/// appears alongside its terminal phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobObservation {
    pub phase: JobPhase,
    pub transcript: String,
    pub result: Option<JobResult>,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Tuning for a [`JobPoller`](crate::poller::JobPoller).
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between consecutive status requests. The first request of every
    /// run is issued immediately.
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_normalizes_to_lowercase() {
        let id = JobId::new("  ABC-123  ").unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn job_id_rejects_empty_input() {
        assert!(JobId::new("").is_none());
        assert!(JobId::new("   ").is_none());
    }

    #[test]
    fn job_id_deserializes_with_normalization() {
        let id: JobId = serde_json::from_str("\"DeadBeef\"").unwrap();
        assert_eq!(id.as_str(), "deadbeef");
        assert!(serde_json::from_str::<JobId>("\"\"").is_err());
    }

    #[test]
    fn phases_use_snake_case_on_the_wire() {
        let phase: JobPhase = serde_json::from_str("\"converted_book\"").unwrap();
        assert_eq!(phase, JobPhase::ConvertedBook);
        assert_eq!(serde_json::to_string(&phase).unwrap(), "\"converted_book\"");
    }

    #[test]
    fn unknown_phase_is_a_decode_error() {
        assert!(serde_json::from_str::<JobPhase>("\"queued\"").is_err());
    }

    #[test]
    fn terminal_phases() {
        assert!(JobPhase::Guessed.is_terminal());
        assert!(JobPhase::ConvertedBook.is_terminal());
        assert!(JobPhase::Failed.is_terminal());
        assert!(!JobPhase::Processing.is_terminal());
        assert!(!JobPhase::ConvertingBook.is_terminal());
    }

    #[test]
    fn snapshot_tolerates_unknown_fields() {
        let snapshot: StatusSnapshot = serde_json::from_str(
            r#"{"phase": "processing", "transcription": "hello", "worker": "w1"}"#,
        )
        .unwrap();
        assert_eq!(snapshot.phase, Some(JobPhase::Processing));
        assert_eq!(snapshot.transcription.as_deref(), Some("hello"));
        assert!(snapshot.guess.is_none());
    }

    #[test]
    fn default_observation_is_idle_and_empty() {
        let obs = JobObservation::default();
        assert_eq!(obs.phase, JobPhase::Idle);
        assert!(obs.transcript.is_empty());
        assert!(obs.result.is_none());
    }
}
