use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::SpeechBackend;
use crate::metrics::SpeechMetrics;
use crate::next_session_id;
use crate::sink::AudioSink;
use crate::types::{AudioClip, SessionOutcome, SessionPhase, SpeakerEvent, SpeechConfig};

/// Turns long text into gapless, strictly-ordered audio playback.
///
/// Each call to [`play`](Self::play) opens a *session*: the text is split
/// into sentences by the backend, the first few sentences are synthesized
/// up front, and from then on the pipeline plays segment `n` while
/// prefetching segment `n + depth`, so at most `prefetch_depth` clips ever
/// sit synthesized-but-unplayed. Segments whose synthesis fails are
/// skipped; order is never reshuffled to paper over a gap.
///
/// One session is live at a time. Starting a new one cancels the old one
/// without waiting for it: the old sink playback stops on its token, and
/// the sink itself guarantees the speech resource is free before the new
/// session's first clip starts. Must be used inside a Tokio runtime.
pub struct Speaker<B: SpeechBackend, S: AudioSink> {
    backend: Arc<B>,
    sink: Arc<S>,
    config: SpeechConfig,
    event_tx: mpsc::Sender<SpeakerEvent>,
    metrics: Arc<SpeechMetrics>,
    current: Mutex<Option<SessionHandle>>,
}

struct SessionHandle {
    id: u64,
    cancel: CancellationToken,
    phase_rx: watch::Receiver<SessionPhase>,
    task: JoinHandle<()>,
}

impl<B: SpeechBackend, S: AudioSink> Speaker<B, S> {
    pub fn new(
        backend: Arc<B>,
        sink: Arc<S>,
        config: SpeechConfig,
        event_tx: mpsc::Sender<SpeakerEvent>,
    ) -> Self {
        let config = SpeechConfig {
            prefetch_depth: config.prefetch_depth.max(1),
        };
        Self {
            backend,
            sink,
            config,
            event_tx,
            metrics: Arc::new(SpeechMetrics::default()),
            current: Mutex::new(None),
        }
    }

    /// Start speaking `text`, replacing any session already in flight.
    ///
    /// The old session is cancelled, not awaited; its `SessionEnded` event
    /// still arrives on the shared channel. Returns the new session's id.
    pub fn play(&self, text: impl Into<String>) -> u64 {
        let id = next_session_id();
        let cancel = CancellationToken::new();
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Splitting);

        let session = SessionTask {
            id,
            text: text.into(),
            backend: Arc::clone(&self.backend),
            sink: Arc::clone(&self.sink),
            config: self.config.clone(),
            events: self.event_tx.clone(),
            metrics: Arc::clone(&self.metrics),
            cancel: cancel.clone(),
            phase_tx,
        };

        let mut slot = self.current.lock();
        if let Some(previous) = slot.take() {
            debug!(
                target: "speech",
                session_id = previous.id,
                replaced_by = id,
                "cancelling previous session"
            );
            previous.cancel.cancel();
        }
        self.metrics.sessions_started.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(session.run());
        *slot = Some(SessionHandle {
            id,
            cancel,
            phase_rx,
            task,
        });
        id
    }

    /// Cancel the current session, if any. Cooperative: ongoing network
    /// fetches finish on their own, audible output stops promptly.
    pub fn cancel(&self) {
        if let Some(current) = self.current.lock().as_ref() {
            debug!(target: "speech", session_id = current.id, "cancel requested");
            current.cancel.cancel();
        }
    }

    /// Whether a session is live right now.
    pub fn is_speaking(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map_or(false, |session| !session.phase_rx.borrow().is_terminal())
    }

    pub fn session_phase(&self) -> Option<SessionPhase> {
        self.current
            .lock()
            .as_ref()
            .map(|session| *session.phase_rx.borrow())
    }

    /// Id of the most recently started session, finished or not.
    pub fn current_session(&self) -> Option<u64> {
        self.current.lock().as_ref().map(|session| session.id)
    }

    pub fn metrics(&self) -> Arc<SpeechMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Resolves once the most recently started session has ended. Returns
    /// immediately when nothing is live.
    pub async fn wait_until_idle(&self) {
        let phase_rx = self
            .current
            .lock()
            .as_ref()
            .map(|session| session.phase_rx.clone());
        let Some(mut phase_rx) = phase_rx else {
            return;
        };
        loop {
            if phase_rx.borrow_and_update().is_terminal() {
                return;
            }
            if phase_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<B: SpeechBackend, S: AudioSink> Drop for Speaker<B, S> {
    fn drop(&mut self) {
        if let Some(session) = self.current.get_mut().take() {
            session.cancel.cancel();
            session.task.abort();
        }
    }
}

/// State owned by one spawned playback session.
struct SessionTask<B, S> {
    id: u64,
    text: String,
    backend: Arc<B>,
    sink: Arc<S>,
    config: SpeechConfig,
    events: mpsc::Sender<SpeakerEvent>,
    metrics: Arc<SpeechMetrics>,
    cancel: CancellationToken,
    phase_tx: watch::Sender<SessionPhase>,
}

impl<B: SpeechBackend, S: AudioSink> SessionTask<B, S> {
    async fn run(self) {
        let outcome = self.drive().await;
        match &outcome {
            SessionOutcome::Completed => {}
            SessionOutcome::Cancelled => {
                self.metrics.sessions_cancelled.fetch_add(1, Ordering::Relaxed);
            }
            SessionOutcome::SplitFailed(_) => {
                self.metrics.split_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        info!(
            target: "speech",
            session_id = self.id,
            outcome = %outcome,
            "playback session ended"
        );
        self.phase_tx.send_replace(SessionPhase::Ended);
        self.emit(SpeakerEvent::SessionEnded {
            session_id: self.id,
            outcome,
        })
        .await;
    }

    async fn drive(&self) -> SessionOutcome {
        let sentences = match self.backend.split(&self.text).await {
            Ok(sentences) => sentences,
            Err(err) => {
                warn!(
                    target: "speech",
                    session_id = self.id,
                    error = %err,
                    "sentence splitting failed"
                );
                return SessionOutcome::SplitFailed(err.to_string());
            }
        };
        debug!(
            target: "speech",
            session_id = self.id,
            segments = sentences.len(),
            "text split into sentences"
        );
        self.emit(SpeakerEvent::SessionStarted {
            session_id: self.id,
            segments: sentences.len(),
        })
        .await;

        if self.cancel.is_cancelled() {
            return SessionOutcome::Cancelled;
        }

        // Prime the buffer before anything becomes audible.
        self.phase_tx.send_replace(SessionPhase::Buffering);
        let mut buffer: VecDeque<(usize, AudioClip)> = VecDeque::new();
        let mut cursor = 0usize;
        while cursor < sentences.len().min(self.config.prefetch_depth) {
            if self.cancel.is_cancelled() {
                return SessionOutcome::Cancelled;
            }
            if let Some(clip) = self.fetch(&sentences, cursor).await {
                buffer.push_back((cursor, clip));
            }
            cursor += 1;
        }

        loop {
            if self.cancel.is_cancelled() {
                return SessionOutcome::Cancelled;
            }

            let (index, clip) = match buffer.pop_front() {
                Some(entry) => entry,
                None if cursor >= sentences.len() => return SessionOutcome::Completed,
                None => {
                    // Sustained synthesis failures can drain the buffer
                    // before playback catches up; refill inline.
                    self.phase_tx.send_replace(SessionPhase::Buffering);
                    if let Some(clip) = self.fetch(&sentences, cursor).await {
                        buffer.push_back((cursor, clip));
                    }
                    cursor += 1;
                    continue;
                }
            };

            self.phase_tx.send_replace(SessionPhase::Playing);
            self.emit(SpeakerEvent::SegmentStarted {
                session_id: self.id,
                index,
            })
            .await;

            // Play this clip while prefetching one more sentence; both must
            // settle before the next clip may start, which is what keeps
            // the buffer bounded and the order strict.
            let lookahead = if cursor < sentences.len() {
                Some(cursor)
            } else {
                None
            };
            let ((), fetched) = tokio::join!(self.play(index, clip), async {
                match lookahead {
                    Some(next) => self
                        .fetch(&sentences, next)
                        .await
                        .map(|clip| (next, clip)),
                    None => None,
                }
            });
            if lookahead.is_some() {
                cursor += 1;
            }
            if let Some(entry) = fetched {
                buffer.push_back(entry);
            }
        }
    }

    async fn play(&self, index: usize, clip: AudioClip) {
        match self.sink.play(clip, &self.cancel).await {
            Ok(()) => {
                self.metrics.segments_played.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                // A clip that cannot be played counts as finished.
                warn!(
                    target: "speech",
                    session_id = self.id,
                    index,
                    error = %err,
                    "playback failed; moving on"
                );
            }
        }
    }

    async fn fetch(&self, sentences: &[String], index: usize) -> Option<AudioClip> {
        match self.backend.synthesize(&sentences[index]).await {
            Ok(clip) => Some(clip),
            Err(err) => {
                warn!(
                    target: "speech",
                    session_id = self.id,
                    index,
                    error = %err,
                    "synthesis failed; segment skipped"
                );
                self.metrics.segments_skipped.fetch_add(1, Ordering::Relaxed);
                self.emit(SpeakerEvent::SegmentSkipped {
                    session_id: self.id,
                    index,
                })
                .await;
                None
            }
        }
    }

    async fn emit(&self, event: SpeakerEvent) {
        if self.events.send(event).await.is_err() {
            debug!(
                target: "speech",
                session_id = self.id,
                "event receiver dropped"
            );
        }
    }
}
