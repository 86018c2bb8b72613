use async_trait::async_trait;
use parlance_audio::AudioFrame;
use parlance_foundation::{AdapterConfig, SttError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::types::TranscriptEvent;

/// Input side of one streaming transcription session.
#[derive(Debug)]
pub enum SttInput {
    Frame(AudioFrame),
    /// End of audio; the adapter produces any remaining finals and closes.
    End,
}

/// A speech-to-text provider.
///
/// Adapters never see the scheduler: they are handed an event sender at
/// `open` and post everything through it. The scheduler owns the returned
/// session and drops or aborts it on its own schedule.
#[async_trait]
pub trait SttAdapter: Send + Sync {
    /// Stable registry identifier, e.g. `"websocket.stt"`.
    fn id(&self) -> &'static str;

    /// Establish a provider streaming session.
    async fn open(
        &self,
        config: &AdapterConfig,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<SttSession, SttError>;
}

/// Handle to a running transcription stream.
pub struct SttSession {
    input_tx: mpsc::Sender<SttInput>,
    task: JoinHandle<()>,
}

impl SttSession {
    pub fn new(input_tx: mpsc::Sender<SttInput>, task: JoinHandle<()>) -> Self {
        Self { input_tx, task }
    }

    /// Non-blocking frame handoff. A full channel drops the frame with a
    /// warning rather than stalling the scheduler.
    pub fn push(&self, frame: AudioFrame) {
        if let Err(err) = self.input_tx.try_send(SttInput::Frame(frame)) {
            tracing::warn!(error = %err, "stt input channel full, frame dropped");
        }
    }

    /// Signal end-of-audio.
    pub fn finish(&self) {
        let _ = self.input_tx.try_send(SttInput::End);
    }

    /// Drop the stream without waiting for remaining finals.
    pub fn abort(self) {
        self.task.abort();
    }
}
