//! Command execution: wires the backend client into the polling and
//! playback engines and renders their progress on the terminal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use bookvox_backend::{BackendClient, BackendError, BookGuess};
use bookvox_foundation::ShutdownGuard;
use bookvox_jobs::{
    JobId, JobObservation, JobPhase, JobPoller, JobResult, PollerConfig, StatusSource,
};
use bookvox_speech::{SessionOutcome, SpeakerEvent, Speaker, SpeechConfig};

use crate::player::PlayerSink;
use crate::Settings;

/// How often a watcher re-checks that the poll task is still alive. A run
/// stops silently when a status fetch fails; the terminal has to notice on
/// its own and stop waiting.
const STALL_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between shelf-index attempts while conversion is still running.
const SHELF_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Tracks what has already been printed so only changes reach the screen.
#[derive(Default)]
struct ProgressPrinter {
    phase: Option<JobPhase>,
    transcript: String,
    result_shown: bool,
}

impl ProgressPrinter {
    fn show(&mut self, observation: &JobObservation) {
        if self.phase != Some(observation.phase) {
            self.phase = Some(observation.phase);
            println!("[{}]", observation.phase);
        }

        if !observation.transcript.is_empty() && observation.transcript != self.transcript {
            self.transcript = observation.transcript.clone();
            println!("heard: {}", observation.transcript);
        }

        if self.result_shown {
            return;
        }
        match &observation.result {
            Some(JobResult::Guess(payload)) => {
                self.result_shown = true;
                match BookGuess::from_value(payload) {
                    BookGuess::Confident { title, author } => {
                        println!("guess: {} by {}", title, author);
                    }
                    BookGuess::NeedClarification { question } => {
                        println!("clarification needed: {}", question);
                    }
                    BookGuess::Unrecognized(raw) => println!("guess: {}", raw),
                }
            }
            Some(JobResult::Ebook(path)) => {
                self.result_shown = true;
                println!("ebook ready: {}", path);
            }
            None => {}
        }
    }
}

/// Drive the poller's current run to its end, printing observation changes.
///
/// Returns once the phase settles, the poll task halts after a status
/// failure, or shutdown is requested, whichever comes first.
pub async fn follow_job<S: StatusSource>(
    poller: &JobPoller<S>,
    shutdown: &ShutdownGuard,
) -> JobObservation {
    let mut rx = poller.subscribe();
    let mut printer = ProgressPrinter::default();
    let initial = rx.borrow_and_update().clone();
    printer.show(&initial);
    if initial.phase.is_terminal() {
        return initial;
    }

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let observation = rx.borrow_and_update().clone();
                printer.show(&observation);
                if observation.phase.is_terminal() {
                    break;
                }
            }
            _ = shutdown.wait() => break,
            _ = tokio::time::sleep(STALL_CHECK_INTERVAL) => {
                if !poller.is_polling() {
                    break;
                }
            }
        }
    }

    let last = poller.observation();
    printer.show(&last);
    if !last.phase.is_terminal() && !shutdown.is_shutdown_requested() {
        warn!(target: "app", phase = %last.phase, "status updates stopped before the job settled");
        println!("lost contact with the backend; try again later");
    }
    last
}

async fn watch_job(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    job: JobId,
) -> JobObservation {
    let mut poller = JobPoller::new(
        Arc::clone(client),
        PollerConfig {
            interval: settings.poll_interval(),
        },
    );
    poller.set_job(Some(job)).await;
    let observation = follow_job(&poller, shutdown).await;
    poller.shutdown().await;
    observation
}

/// Exit-code mapping shared by every job-watching command.
fn finish(observation: JobObservation, shutdown: &ShutdownGuard) -> Result<()> {
    if shutdown.is_shutdown_requested() {
        return Ok(());
    }
    match observation.phase {
        JobPhase::Failed => bail!("job failed"),
        phase if phase.is_terminal() => Ok(()),
        _ => bail!("backend stopped reporting status"),
    }
}

pub async fn run_ask(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    audio_file: &Path,
) -> Result<()> {
    let bytes = tokio::fs::read(audio_file)
        .await
        .with_context(|| format!("reading {}", audio_file.display()))?;
    let filename = audio_file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("recording.webm");

    let receipt = client.submit_recording(filename, bytes).await?;
    info!(target: "app", job = %receipt.job_id, "recording submitted");
    println!("job {}", receipt.job_id);

    let observation = watch_job(client, settings, shutdown, receipt.job_id).await;
    finish(observation, shutdown)
}

pub async fn run_watch(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    job: JobId,
) -> Result<()> {
    let observation = watch_job(client, settings, shutdown, job).await;
    finish(observation, shutdown)
}

pub async fn run_clarify(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    job: JobId,
    answer: &str,
) -> Result<()> {
    let mut poller = JobPoller::new(
        Arc::clone(client),
        PollerConfig {
            interval: settings.poll_interval(),
        },
    );
    poller.set_job(Some(job.clone())).await;

    // Let the current run settle first so the question on file is visible.
    follow_job(&poller, shutdown).await;
    if shutdown.is_shutdown_requested() {
        poller.shutdown().await;
        return Ok(());
    }

    client.answer_clarification(&job, answer).await?;
    println!("answer sent; waiting for a new guess");

    // The initial run was started with trigger 0.
    poller.restart(1).await;
    let observation = follow_job(&poller, shutdown).await;
    poller.shutdown().await;
    finish(observation, shutdown)
}

pub async fn run_fetch(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    job: JobId,
) -> Result<()> {
    let mut poller = JobPoller::new(
        Arc::clone(client),
        PollerConfig {
            interval: settings.poll_interval(),
        },
    );
    poller.set_job(Some(job.clone())).await;

    follow_job(&poller, shutdown).await;
    if shutdown.is_shutdown_requested() {
        poller.shutdown().await;
        return Ok(());
    }

    client.request_fetch(&job).await?;
    println!("conversion requested; following the job");

    // The initial run was started with trigger 0.
    poller.restart(1).await;
    let observation = follow_job(&poller, shutdown).await;
    poller.shutdown().await;
    finish(observation, shutdown)
}

/// Poll the converted-book index until it exists.
///
/// Not-ready and transport failures mean "keep waiting"; a malformed index
/// is final. Returns `None` when shutdown interrupts the wait.
pub async fn wait_for_shelf(
    client: &BackendClient,
    job: &JobId,
    shutdown: &ShutdownGuard,
) -> Result<Option<Vec<String>>> {
    let mut announced = false;
    loop {
        if shutdown.is_shutdown_requested() {
            return Ok(None);
        }
        match client.ebook_index(job).await {
            Ok(sections) => return Ok(Some(sections)),
            Err(BackendError::NotReady) | Err(BackendError::Network(_)) => {
                if !announced {
                    announced = true;
                    println!("waiting for the converted book...");
                }
                debug!(target: "app", job = %job, "shelf index not ready");
            }
            Err(other) => return Err(other.into()),
        }
        tokio::select! {
            _ = tokio::time::sleep(SHELF_RETRY_INTERVAL) => {}
            _ = shutdown.wait() => return Ok(None),
        }
    }
}

pub async fn run_sections(
    client: &BackendClient,
    shutdown: &ShutdownGuard,
    job: JobId,
) -> Result<()> {
    let sections = match wait_for_shelf(client, &job, shutdown).await? {
        Some(sections) => sections,
        None => return Ok(()),
    };
    if sections.is_empty() {
        println!("the converted book has no sections");
        return Ok(());
    }
    for name in &sections {
        println!("{}", name);
    }
    Ok(())
}

pub async fn run_read(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    job: JobId,
    section: Option<String>,
) -> Result<()> {
    let sections = match wait_for_shelf(client, &job, shutdown).await? {
        Some(sections) => sections,
        None => return Ok(()),
    };
    if sections.is_empty() {
        bail!("the converted book has no sections");
    }

    let name = match section {
        Some(requested) => {
            if !sections.iter().any(|s| s == &requested) {
                bail!(
                    "section {} not found; run `bookvox sections {}` to list them",
                    requested,
                    job
                );
            }
            requested
        }
        None => sections[0].clone(),
    };

    let text = client.ebook_section(&job, &name).await?;
    println!("reading {}", name);
    speak_text(client, settings, shutdown, text).await
}

pub async fn run_speak(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    text_file: &Path,
) -> Result<()> {
    let text = tokio::fs::read_to_string(text_file)
        .await
        .with_context(|| format!("reading {}", text_file.display()))?;
    if text.trim().is_empty() {
        bail!("{} is empty", text_file.display());
    }
    speak_text(client, settings, shutdown, text).await
}

/// Speak `text` through the playback pipeline, routing Ctrl-C into a
/// session cancel and draining events until the session ends.
async fn speak_text(
    client: &Arc<BackendClient>,
    settings: &Settings,
    shutdown: &ShutdownGuard,
    text: String,
) -> Result<()> {
    let (event_tx, mut events) = mpsc::channel(64);
    let sink = Arc::new(PlayerSink::new(settings.player_cmd.clone()));
    let speaker = Speaker::new(
        Arc::clone(client),
        sink,
        SpeechConfig {
            prefetch_depth: settings.prefetch_depth,
        },
        event_tx,
    );
    let session = speaker.play(text);

    let mut cancelled = false;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SpeakerEvent::SessionStarted { session_id, segments }) if session_id == session => {
                    println!("speaking {} segment(s)", segments);
                }
                Some(SpeakerEvent::SegmentStarted { session_id, index }) if session_id == session => {
                    debug!(target: "app", index, "segment started");
                }
                Some(SpeakerEvent::SegmentSkipped { session_id, index }) if session_id == session => {
                    println!("segment {} skipped (synthesis failed)", index + 1);
                }
                Some(SpeakerEvent::SessionEnded { session_id, outcome }) if session_id == session => {
                    break outcome;
                }
                Some(_) => {}
                None => break SessionOutcome::Cancelled,
            },
            _ = shutdown.wait(), if !cancelled => {
                info!(target: "app", "cancelling playback");
                speaker.cancel();
                cancelled = true;
            }
        }
    };

    match outcome {
        SessionOutcome::Completed => {
            println!("done");
            Ok(())
        }
        SessionOutcome::Cancelled => {
            println!("playback cancelled");
            Ok(())
        }
        SessionOutcome::SplitFailed(reason) => bail!("could not split the text: {}", reason),
    }
}
