use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SpeechResult;
use crate::types::AudioClip;

/// Playback end of the pipeline.
///
/// `play` resolves once the clip has finished, failed, or was stopped
/// because `cancel` fired. Implementations hold at most one live playback
/// resource at a time and release it promptly on cancellation; a play that
/// starts after the token already fired does nothing.
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    async fn play(&self, clip: AudioClip, cancel: &CancellationToken) -> SpeechResult<()>;
}
