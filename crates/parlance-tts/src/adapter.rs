use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use parlance_foundation::{AdapterConfig, TtsError};

use crate::types::TtsEvent;

/// Input side of one synthesis stream.
#[derive(Debug)]
pub enum TtsText {
    /// One sentence-sized chunk from the accumulator.
    Push(String),
    /// No more text is coming; synthesize the rest and emit `End`.
    Finish,
}

/// A streaming text-to-speech provider.
///
/// Audio starts flowing before the full response text is known: the session
/// receives sentence-sized pushes and emits PCM as it goes. Cancellation is
/// cooperative through the token; a cancelled session emits `End` and stops.
#[async_trait]
pub trait TtsAdapter: Send + Sync {
    fn id(&self) -> &'static str;

    async fn open(
        &self,
        config: &AdapterConfig,
        events: mpsc::Sender<TtsEvent>,
        cancel: CancellationToken,
    ) -> Result<TtsSession, TtsError>;
}

/// Handle to a running synthesis stream.
pub struct TtsSession {
    text_tx: mpsc::Sender<TtsText>,
    task: JoinHandle<()>,
}

impl TtsSession {
    pub fn new(text_tx: mpsc::Sender<TtsText>, task: JoinHandle<()>) -> Self {
        Self { text_tx, task }
    }

    pub fn push_text(&self, text: String) {
        if let Err(err) = self.text_tx.try_send(TtsText::Push(text)) {
            tracing::warn!(error = %err, "tts text channel full, chunk dropped");
        }
    }

    pub fn finish(&self) {
        let _ = self.text_tx.try_send(TtsText::Finish);
    }

    /// Hard stop, used after the cancellation deadline expires.
    pub fn abort(self) {
        self.task.abort();
    }
}
