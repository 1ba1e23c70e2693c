//! Scripted backend and recording sink for exercising the pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::backend::SpeechBackend;
use crate::error::{SpeechError, SpeechResult};
use crate::sink::AudioSink;
use crate::types::AudioClip;

/// Tracks how many synthesized clips are waiting to be played.
///
/// Shared between a [`MockSpeechBackend`] (which raises the gauge when a
/// synthesis completes) and a [`RecordingSink`] (which lowers it when the
/// clip becomes audible), so a test can pin down the prefetch bound.
#[derive(Debug, Default)]
pub struct PrefetchGauge {
    outstanding: AtomicI64,
    peak: AtomicI64,
}

impl PrefetchGauge {
    pub fn produced(&self) {
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn consumed(&self) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of clips that were ever synthesized but unplayed.
    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Deterministic stand-in for the split and synthesis services.
///
/// Splitting is naive-but-stable: sentences end at `.`. Synthesis returns
/// the sentence's own bytes as the clip, so sinks can tell clips apart.
pub struct MockSpeechBackend {
    split_error: Option<String>,
    synth_failures: HashSet<String>,
    synth_delay: Duration,
    sentence_delays: HashMap<String, Duration>,
    split_calls: AtomicU64,
    synth_calls: AtomicU64,
    synth_log: Mutex<Vec<String>>,
    gauge: Option<Arc<PrefetchGauge>>,
}

impl Default for MockSpeechBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpeechBackend {
    pub fn new() -> Self {
        Self {
            split_error: None,
            synth_failures: HashSet::new(),
            synth_delay: Duration::ZERO,
            sentence_delays: HashMap::new(),
            split_calls: AtomicU64::new(0),
            synth_calls: AtomicU64::new(0),
            synth_log: Mutex::new(Vec::new()),
            gauge: None,
        }
    }

    /// Make every `split` call fail with `reason`.
    pub fn failing_split(mut self, reason: &str) -> Self {
        self.split_error = Some(reason.to_string());
        self
    }

    /// Make synthesis of this exact sentence fail.
    pub fn failing_synthesis(mut self, sentence: &str) -> Self {
        self.synth_failures.insert(sentence.to_string());
        self
    }

    /// Simulated synthesis latency for every sentence.
    pub fn with_synth_delay(mut self, delay: Duration) -> Self {
        self.synth_delay = delay;
        self
    }

    /// Extra latency for one specific sentence.
    pub fn with_sentence_delay(mut self, sentence: &str, delay: Duration) -> Self {
        self.sentence_delays.insert(sentence.to_string(), delay);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<PrefetchGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn split_calls(&self) -> u64 {
        self.split_calls.load(Ordering::SeqCst)
    }

    pub fn synth_calls(&self) -> u64 {
        self.synth_calls.load(Ordering::SeqCst)
    }

    /// Sentences sent to synthesis, in request order.
    pub fn synth_log(&self) -> Vec<String> {
        self.synth_log.lock().clone()
    }
}

fn naive_split(text: &str) -> Vec<String> {
    text.split('.')
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .map(|sentence| format!("{sentence}."))
        .collect()
}

#[async_trait]
impl SpeechBackend for MockSpeechBackend {
    async fn split(&self, text: &str) -> SpeechResult<Vec<String>> {
        self.split_calls.fetch_add(1, Ordering::SeqCst);
        match &self.split_error {
            Some(reason) => Err(SpeechError::Split(reason.clone())),
            None => Ok(naive_split(text)),
        }
    }

    async fn synthesize(&self, sentence: &str) -> SpeechResult<AudioClip> {
        self.synth_calls.fetch_add(1, Ordering::SeqCst);
        self.synth_log.lock().push(sentence.to_string());

        let mut delay = self.synth_delay;
        if let Some(extra) = self.sentence_delays.get(sentence) {
            delay += *extra;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.synth_failures.contains(sentence) {
            return Err(SpeechError::Synthesis(format!(
                "no audio for {sentence:?}"
            )));
        }
        if let Some(gauge) = &self.gauge {
            gauge.produced();
        }
        Ok(AudioClip::new(sentence.as_bytes().to_vec()))
    }
}

/// Sink that simulates playback time and records what it was asked to do.
///
/// Holds the same single-resource discipline as a real sink: a lock
/// serializes plays, and a play that begins after cancellation does not
/// start at all.
pub struct RecordingSink {
    clip_duration: Duration,
    slot: tokio::sync::Mutex<()>,
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    interrupted: AtomicU64,
    live: AtomicUsize,
    max_live: AtomicUsize,
    gauge: Option<Arc<PrefetchGauge>>,
}

impl RecordingSink {
    pub fn new(clip_duration: Duration) -> Self {
        Self {
            clip_duration,
            slot: tokio::sync::Mutex::new(()),
            started: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            interrupted: AtomicU64::new(0),
            live: AtomicUsize::new(0),
            max_live: AtomicUsize::new(0),
            gauge: None,
        }
    }

    pub fn with_gauge(mut self, gauge: Arc<PrefetchGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Clips that became audible, in order.
    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    /// Clips that ran to their natural end, in order.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }

    /// Plays stopped early by a cancellation token.
    pub fn interrupted(&self) -> u64 {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live plays ever observed.
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

struct LiveGuard<'a>(&'a AtomicUsize);

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, clip: AudioClip, cancel: &CancellationToken) -> SpeechResult<()> {
        let _slot = self.slot.lock().await;
        if cancel.is_cancelled() {
            self.interrupted.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        let _live = LiveGuard(&self.live);

        if let Some(gauge) = &self.gauge {
            gauge.consumed();
        }
        let text = String::from_utf8_lossy(clip.bytes()).into_owned();
        self.started.lock().push(text.clone());

        tokio::select! {
            _ = tokio::time::sleep(self.clip_duration) => {
                self.completed.lock().push(text);
            }
            _ = cancel.cancelled() => {
                self.interrupted.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}
