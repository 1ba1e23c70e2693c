//! Scripted status source for tests and offline demos.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::source::{StatusError, StatusSource};
use crate::types::{JobId, StatusSnapshot};

/// Plays back a fixed sequence of fetch outcomes and records how it was
/// driven, so tests can assert on request counts, concurrency, and the job
/// ids that actually went over the wire.
///
/// Once the script is exhausted, further fetches fail with a transport
/// error so a test that polls longer than scripted fails loudly; call
/// [`repeating_last`](Self::repeating_last) to instead keep serving the
/// last successful snapshot forever.
pub struct MockStatusSource {
    steps: Mutex<VecDeque<Result<StatusSnapshot, StatusError>>>,
    last_served: Mutex<Option<StatusSnapshot>>,
    repeat_last: bool,
    delay: Duration,
    fetches: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen_jobs: Mutex<Vec<JobId>>,
}

impl MockStatusSource {
    pub fn new(steps: Vec<Result<StatusSnapshot, StatusError>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last_served: Mutex::new(None),
            repeat_last: false,
            delay: Duration::ZERO,
            fetches: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen_jobs: Mutex::new(Vec::new()),
        }
    }

    /// Simulated network latency per fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep serving the last successful snapshot after the script runs out.
    pub fn repeating_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Highest number of fetches ever live at the same moment.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen_jobs(&self) -> Vec<JobId> {
        self.seen_jobs.lock().clone()
    }
}

// Balances the in-flight gauge even when a fetch future is dropped mid-wait.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusSource for MockStatusSource {
    async fn fetch_status(&self, job: &JobId) -> Result<StatusSnapshot, StatusError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.seen_jobs.lock().push(job.clone());

        let live = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(live, Ordering::SeqCst);
        let _in_flight = InFlight(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step = self.steps.lock().pop_front();
        match step {
            Some(Ok(snapshot)) => {
                *self.last_served.lock() = Some(snapshot.clone());
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => {
                if self.repeat_last {
                    Ok(self.last_served.lock().clone().unwrap_or_default())
                } else {
                    Err(StatusError::Transport("status script exhausted".into()))
                }
            }
        }
    }
}
