use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use bookvox_jobs::{
    JobId, JobObservation, JobPhase, JobPoller, JobResult, MockStatusSource, PollerConfig,
    StatusError, StatusSnapshot, StatusSource,
};

fn config(interval_ms: u64) -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(interval_ms),
    }
}

fn job(raw: &str) -> JobId {
    JobId::new(raw).unwrap()
}

fn phase(phase: JobPhase) -> StatusSnapshot {
    StatusSnapshot {
        phase: Some(phase),
        ..Default::default()
    }
}

fn phase_with_text(p: JobPhase, text: &str) -> StatusSnapshot {
    StatusSnapshot {
        phase: Some(p),
        transcription: Some(text.to_string()),
        ..Default::default()
    }
}

/// Waits for the current polling run to finish on its own.
async fn settle<S: StatusSource>(poller: &JobPoller<S>) {
    for _ in 0..500 {
        if !poller.is_polling() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("polling run did not settle in time");
}

#[tokio::test(start_paused = true)]
async fn first_poll_is_immediate_then_interval_spaced() {
    let source = Arc::new(MockStatusSource::new(vec![
        Ok(phase(JobPhase::Processing)),
        Ok(phase(JobPhase::Processing)),
    ]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(60_000));

    poller.set_job(Some(job("j1"))).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    // No virtual time has passed, yet the first request already went out.
    assert_eq!(source.fetch_count(), 1);

    tokio::time::advance(Duration::from_secs(59)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(source.fetch_count(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_eq!(source.fetch_count(), 2);

    poller.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn lifecycle_folds_snapshots_and_stops_at_terminal() {
    let guess = json!({"status": "confident", "title": "Dune", "author": "Frank Herbert"});
    let source = Arc::new(MockStatusSource::new(vec![
        Ok(phase(JobPhase::Processing)),
        Ok(phase_with_text(JobPhase::Processing, "hello")),
        Ok(StatusSnapshot {
            phase: Some(JobPhase::Guessed),
            guess: Some(guess.clone()),
            ..Default::default()
        }),
    ]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(50));

    // Optimistic state is visible before the first response lands.
    poller.set_job(Some(job("j1"))).await;
    assert_eq!(poller.observation().phase, JobPhase::Processing);

    settle(&poller).await;

    // The terminal snapshot omitted the transcription; the transcript folded
    // from the earlier snapshot stays.
    assert_eq!(
        poller.observation(),
        JobObservation {
            phase: JobPhase::Guessed,
            transcript: "hello".into(),
            result: Some(JobResult::Guess(guess)),
        }
    );
    assert_eq!(source.fetch_count(), 3);

    // Terminal means terminal: no stray requests afterwards.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.fetch_count(), 3);

    let metrics = poller.metrics();
    assert_eq!(
        metrics
            .runs_completed
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn transcript_never_regresses() {
    let source = Arc::new(MockStatusSource::new(vec![
        Ok(phase_with_text(JobPhase::Processing, "hello")),
        Ok(phase_with_text(JobPhase::Processing, "hello")),
        Ok(phase(JobPhase::Processing)),
        Ok(phase_with_text(JobPhase::Processing, "")),
        Ok(phase_with_text(JobPhase::Processing, "hello world")),
        Ok(phase(JobPhase::Failed)),
    ]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.set_job(Some(job("j1"))).await;
    settle(&poller).await;

    let obs = poller.observation();
    assert_eq!(obs.phase, JobPhase::Failed);
    assert_eq!(obs.transcript, "hello world");
    assert!(obs.result.is_none());

    // Only the two genuinely new texts counted as updates.
    let metrics = poller.metrics();
    assert_eq!(
        metrics
            .transcript_updates
            .load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn transport_error_halts_run_and_keeps_observation() {
    let source = Arc::new(MockStatusSource::new(vec![
        Ok(phase_with_text(JobPhase::DownloadingBook, "hello")),
        Err(StatusError::Transport("connection refused".into())),
    ]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.set_job(Some(job("j1"))).await;
    settle(&poller).await;

    // The last good observation survives the failure untouched.
    let obs = poller.observation();
    assert_eq!(obs.phase, JobPhase::DownloadingBook);
    assert_eq!(obs.transcript, "hello");

    // And the run is over: no retry timer lurking.
    assert_eq!(source.fetch_count(), 2);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.fetch_count(), 2);

    let metrics = poller.metrics();
    assert_eq!(
        metrics.runs_halted.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn parse_error_halts_like_transport() {
    let source = Arc::new(MockStatusSource::new(vec![Err(StatusError::Parse(
        "unknown phase `queued`".into(),
    ))]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.set_job(Some(job("j1"))).await;
    settle(&poller).await;

    assert_eq!(poller.observation().phase, JobPhase::Processing);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn at_most_one_timer_across_job_switches() {
    let source = Arc::new(
        MockStatusSource::new(vec![Ok(phase(JobPhase::Processing))])
            .with_delay(Duration::from_millis(30))
            .repeating_last(),
    );
    let mut poller = JobPoller::new(Arc::clone(&source), config(50));

    poller.set_job(Some(job("job-a"))).await;
    tokio::time::sleep(Duration::from_millis(135)).await;

    // Switch mid-flight; the old run (and any in-flight request) must be
    // gone before the new one starts.
    poller.set_job(Some(job("job-b"))).await;
    tokio::time::sleep(Duration::from_millis(135)).await;

    poller.set_job(None).await;
    let after_clear = source.fetch_count();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(source.max_in_flight(), 1);
    assert_eq!(source.fetch_count(), after_clear);

    // Once job-b shows up, job-a never does again.
    let seen = source.seen_jobs();
    let first_b = seen
        .iter()
        .position(|id| id.as_str() == "job-b")
        .expect("job-b was polled");
    assert!(seen[..first_b].iter().all(|id| id.as_str() == "job-a"));
    assert!(seen[first_b..].iter().all(|id| id.as_str() == "job-b"));
}

#[tokio::test(start_paused = true)]
async fn restart_is_gated_on_a_fresh_trigger() {
    let first = json!({"status": "need_clarification", "question": "Which edition?"});
    let second = json!({"status": "confident", "title": "Dune"});
    let source = Arc::new(MockStatusSource::new(vec![
        Ok(StatusSnapshot {
            phase: Some(JobPhase::Guessed),
            guess: Some(first),
            ..Default::default()
        }),
        Ok(phase(JobPhase::Processing)),
        Ok(StatusSnapshot {
            phase: Some(JobPhase::Guessed),
            guess: Some(second.clone()),
            ..Default::default()
        }),
    ]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.set_job(Some(job("j1"))).await;
    settle(&poller).await;
    assert_eq!(source.fetch_count(), 1);

    // Same token as the initial run: nothing happens.
    poller.restart(0).await;
    settle(&poller).await;
    assert_eq!(source.fetch_count(), 1);

    // Fresh token: a new run, which settles on the second guess.
    poller.restart(1).await;
    settle(&poller).await;
    assert_eq!(source.fetch_count(), 3);
    assert_eq!(
        poller.observation().result,
        Some(JobResult::Guess(second))
    );

    // Redelivery of the same token stays inert.
    poller.restart(1).await;
    settle(&poller).await;
    assert_eq!(source.fetch_count(), 3);

    let metrics = poller.metrics();
    assert_eq!(
        metrics
            .runs_completed
            .load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn restart_keeps_transcript_and_clears_result() {
    let source = Arc::new(MockStatusSource::new(vec![
        Ok(StatusSnapshot {
            phase: Some(JobPhase::Guessed),
            transcription: Some("find dune".into()),
            guess: Some(json!({"status": "need_clarification", "question": "Hardcover?"})),
            ..Default::default()
        }),
        Ok(phase(JobPhase::Processing)),
        Ok(phase(JobPhase::Failed)),
    ]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.set_job(Some(job("j1"))).await;
    settle(&poller).await;
    assert!(poller.observation().result.is_some());

    poller.restart(1).await;
    // The reprocessing announcement keeps what was heard but drops the now
    // superseded result.
    let obs = poller.observation();
    assert_eq!(obs.phase, JobPhase::Processing);
    assert_eq!(obs.transcript, "find dune");
    assert!(obs.result.is_none());

    settle(&poller).await;
    let obs = poller.observation();
    assert_eq!(obs.phase, JobPhase::Failed);
    assert_eq!(obs.transcript, "find dune");
    assert!(obs.result.is_none());
}

#[tokio::test(start_paused = true)]
async fn restart_without_job_is_inert() {
    let source = Arc::new(MockStatusSource::new(vec![]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.restart(7).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn job_ids_are_normalized_on_the_wire() {
    let source = Arc::new(MockStatusSource::new(vec![Ok(phase(JobPhase::Failed))]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.set_job(JobId::new("  ABC-123 ")).await;
    settle(&poller).await;

    let seen = source.seen_jobs();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].as_str(), "abc-123");
}

#[tokio::test(start_paused = true)]
async fn switching_and_clearing_reset_the_observation() {
    let source = Arc::new(
        MockStatusSource::new(vec![Ok(phase_with_text(JobPhase::Processing, "hello"))])
            .repeating_last(),
    );
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));

    poller.set_job(Some(job("job-a"))).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(poller.observation().transcript, "hello");

    // A different job starts from a clean slate.
    poller.set_job(Some(job("job-b"))).await;
    let obs = poller.observation();
    assert_eq!(obs.phase, JobPhase::Processing);
    assert!(obs.transcript.is_empty());
    assert!(obs.result.is_none());

    poller.set_job(None).await;
    assert_eq!(poller.observation(), JobObservation::default());
}

#[tokio::test(start_paused = true)]
async fn watch_subscribers_see_updates() {
    let source = Arc::new(MockStatusSource::new(vec![
        Ok(phase_with_text(JobPhase::Processing, "hello")),
        Ok(phase(JobPhase::Failed)),
    ]));
    let mut poller = JobPoller::new(Arc::clone(&source), config(20));
    let mut rx = poller.subscribe();

    poller.set_job(Some(job("j1"))).await;

    let last = loop {
        let obs = rx.borrow_and_update().clone();
        if obs.phase.is_terminal() {
            break obs;
        }
        if rx.changed().await.is_err() {
            break rx.borrow().clone();
        }
    };
    assert_eq!(last.phase, JobPhase::Failed);
    assert_eq!(last.transcript, "hello");
}
