use async_trait::async_trait;

use crate::error::SpeechResult;
use crate::types::AudioClip;

/// The remote speech services behind the playback pipeline.
///
/// Both calls are one-shot and stateless from the pipeline's point of
/// view; the pipeline may overlap a `synthesize` call with ongoing
/// playback but never runs two at once.
#[async_trait]
pub trait SpeechBackend: Send + Sync + 'static {
    /// Split `text` into ordered, playable sentences.
    async fn split(&self, text: &str) -> SpeechResult<Vec<String>>;

    /// Synthesize one sentence into an opaque audio clip.
    async fn synthesize(&self, sentence: &str) -> SpeechResult<AudioClip>;
}
