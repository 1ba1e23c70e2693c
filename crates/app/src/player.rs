//! Audio output through an external player process.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use bookvox_speech::{AudioClip, AudioSink, SpeechError, SpeechResult};

/// Pipes each clip into a freshly spawned player process (`aplay -q -` by
/// default) and kills the child when playback is cancelled.
pub struct PlayerSink {
    command: Vec<String>,
    // One child at a time; playback must never overlap.
    slot: Mutex<()>,
}

impl PlayerSink {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            slot: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AudioSink for PlayerSink {
    async fn play(&self, clip: AudioClip, cancel: &CancellationToken) -> SpeechResult<()> {
        let _live = self.slot.lock().await;
        if cancel.is_cancelled() {
            return Ok(());
        }

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SpeechError::Output("player command is empty".to_string()))?;

        debug!(target: "app", player = %program, bytes = clip.len(), "starting player");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Output(format!("failed to spawn {}: {}", program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpeechError::Output("player stdin unavailable".to_string()))?;

        // Feed the clip, then drop the handle so the player sees EOF.
        let feed = async move {
            stdin.write_all(clip.bytes()).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        };
        tokio::select! {
            written = feed => {
                if let Err(error) = written {
                    // Players can exit before reading everything.
                    debug!(target: "app", error = %error, "player closed its input early");
                }
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Ok(());
            }
        }

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) if !status.success() => {
                    warn!(target: "app", %status, "player exited with failure");
                    Ok(())
                }
                Ok(_) => Ok(()),
                Err(error) => Err(SpeechError::Io(error)),
            },
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Ok(())
            }
        }
    }
}
