use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::metrics::PollerMetrics;
use crate::source::StatusSource;
use crate::types::{JobId, JobObservation, JobPhase, JobResult, PollerConfig, StatusSnapshot};

/// Polls a [`StatusSource`] for one job at a time and folds the raw
/// snapshots into a monotonically-progressing [`JobObservation`].
///
/// A *run* starts when a job is selected (or restarted) and owns the only
/// poll timer in existence: the previous run is always torn down first, so
/// two timers never overlap. The first request of a run goes out
/// immediately, then one request per interval. A run ends on its own in
/// exactly two cases: the job reached a terminal phase, or a fetch failed.
/// In both cases the last observation stays visible and nothing retries
/// until the consumer selects or restarts a job.
pub struct JobPoller<S: StatusSource> {
    source: Arc<S>,
    config: PollerConfig,
    observation: Arc<watch::Sender<JobObservation>>,
    metrics: Arc<PollerMetrics>,
    selection: Option<Selection>,
    task: Option<JoinHandle<()>>,
}

/// What the poller is currently pointed at. A run is keyed by the whole
/// pair: a new job or a new trigger token means a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    job: JobId,
    trigger: u64,
}

impl<S: StatusSource> JobPoller<S> {
    pub fn new(source: Arc<S>, config: PollerConfig) -> Self {
        let (obs_tx, _obs_rx) = watch::channel(JobObservation::default());
        Self {
            source,
            config,
            observation: Arc::new(obs_tx),
            metrics: Arc::new(PollerMetrics::default()),
            selection: None,
            task: None,
        }
    }

    /// Receiver for observation updates. Always reports the latest value;
    /// intermediate states may be conflated under load.
    pub fn subscribe(&self) -> watch::Receiver<JobObservation> {
        self.observation.subscribe()
    }

    /// Snapshot of the current observation.
    pub fn observation(&self) -> JobObservation {
        self.observation.borrow().clone()
    }

    pub fn metrics(&self) -> Arc<PollerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn job(&self) -> Option<&JobId> {
        self.selection.as_ref().map(|sel| &sel.job)
    }

    /// Whether a run is currently live. `false` once the run settled or
    /// halted, even though a job is still selected.
    pub fn is_polling(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Point the poller at `job`, or clear it with `None`.
    ///
    /// Any previous run is fully torn down before the new one starts.
    /// Selecting a job resets the observation and optimistically publishes
    /// `Processing`; clearing resets it to the default idle observation.
    pub async fn set_job(&mut self, job: Option<JobId>) {
        self.teardown().await;
        match job {
            None => {
                self.selection = None;
                self.observation.send_replace(JobObservation::default());
                debug!(target: "jobs", "job cleared; poller idle");
            }
            Some(job) => {
                let selection = Selection { job, trigger: 0 };
                self.start_run(selection, false);
            }
        }
    }

    /// Begin a fresh run for the already-selected job.
    ///
    /// A no-op unless `trigger` differs from the token of the current run
    /// (the initial run of a job carries token 0), so repeated delivery of
    /// the same signal cannot double-start anything. The transcript carries
    /// over; phase flips back to `Processing` and any result is cleared.
    pub async fn restart(&mut self, trigger: u64) {
        let current = match &self.selection {
            Some(selection) => selection.clone(),
            None => {
                debug!(target: "jobs", trigger, "restart requested with no job selected; ignoring");
                return;
            }
        };
        if current.trigger == trigger {
            debug!(
                target: "jobs",
                job = %current.job,
                trigger,
                "restart trigger unchanged; ignoring"
            );
            return;
        }

        self.teardown().await;
        self.start_run(
            Selection {
                job: current.job,
                trigger,
            },
            true,
        );
    }

    /// Stop any live run. The selection and observation are left as they
    /// are, so a later `restart` can pick up where this left off.
    pub async fn shutdown(&mut self) {
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Wait the old run out so its timer is provably gone before a
            // new one can exist.
            let _ = task.await;
        }
    }

    fn start_run(&mut self, selection: Selection, keep_transcript: bool) {
        let seed = if keep_transcript {
            self.observation.borrow().transcript.clone()
        } else {
            String::new()
        };
        self.observation.send_replace(JobObservation {
            phase: JobPhase::Processing,
            transcript: seed.clone(),
            result: None,
        });
        info!(
            target: "jobs",
            job = %selection.job,
            trigger = selection.trigger,
            "starting polling run"
        );

        let task = tokio::spawn(poll_run(
            Arc::clone(&self.source),
            self.config.clone(),
            selection.job.clone(),
            Arc::clone(&self.observation),
            seed,
            Arc::clone(&self.metrics),
        ));
        self.selection = Some(selection);
        self.task = Some(task);
    }
}

impl<S: StatusSource> Drop for JobPoller<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn poll_run<S: StatusSource>(
    source: Arc<S>,
    config: PollerConfig,
    job: JobId,
    observation: Arc<watch::Sender<JobObservation>>,
    mut last_accepted: String,
    metrics: Arc<PollerMetrics>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // The first tick of a fresh interval completes immediately.
        ticker.tick().await;
        metrics.polls_issued.fetch_add(1, Ordering::Relaxed);

        let snapshot = match source.fetch_status(&job).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(target: "jobs", job = %job, error = %err, "status poll failed; run halted");
                metrics.runs_halted.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        metrics.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        let mut effect = SnapshotEffect::default();
        observation.send_modify(|obs| {
            effect = apply_snapshot(obs, &snapshot, &mut last_accepted);
        });

        if effect.transcript_updated {
            metrics.transcript_updates.fetch_add(1, Ordering::Relaxed);
            debug!(target: "jobs", job = %job, "transcript updated");
        }
        if effect.phase.is_terminal() {
            info!(
                target: "jobs",
                job = %job,
                phase = %effect.phase,
                "job settled; polling stopped"
            );
            metrics.runs_completed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct SnapshotEffect {
    phase: JobPhase,
    transcript_updated: bool,
}

/// Folds one snapshot into the observation.
///
/// Absent fields leave their counterpart untouched. The transcript only
/// moves when the reported text is non-empty and differs from the last
/// value accepted this job, so churn and blank reports never regress it.
/// Result payloads attach only together with their terminal phase.
fn apply_snapshot(
    obs: &mut JobObservation,
    snapshot: &StatusSnapshot,
    last_accepted: &mut String,
) -> SnapshotEffect {
    let mut effect = SnapshotEffect::default();

    if let Some(phase) = snapshot.phase {
        obs.phase = phase;
    }

    if let Some(text) = snapshot.transcription.as_deref() {
        if !text.is_empty() && text != last_accepted {
            obs.transcript = text.to_string();
            *last_accepted = obs.transcript.clone();
            effect.transcript_updated = true;
        }
    }

    match obs.phase {
        JobPhase::Guessed => {
            if let Some(guess) = snapshot.guess.clone() {
                obs.result = Some(JobResult::Guess(guess));
            }
        }
        JobPhase::ConvertedBook => {
            if let Some(path) = snapshot.ebook_path.clone() {
                obs.result = Some(JobResult::Ebook(path));
            }
        }
        _ => {}
    }

    effect.phase = obs.phase;
    effect
}
