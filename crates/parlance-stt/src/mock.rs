//! Scripted in-process adapter for tests and wiring checks.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use parlance_foundation::{AdapterConfig, AdapterConfigExt, SttError};

use crate::adapter::{SttAdapter, SttInput, SttSession};
use crate::types::{next_utterance_id, TranscriptEvent};

#[derive(Debug, Clone)]
pub struct MockSttScript {
    /// Emit an interim once this many frames have arrived.
    pub interim_after_frames: Option<(usize, String)>,
    /// Final transcript emitted on end-of-audio. `None` never answers,
    /// which is how the final-transcript timeout is exercised.
    pub final_text: Option<String>,
    /// Delay between end-of-audio and the final event.
    pub finalize_delay: Duration,
    /// Fail the stream as soon as it opens.
    pub fail_stream: Option<MockFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Transient,
    Fatal,
}

impl Default for MockSttScript {
    fn default() -> Self {
        Self {
            interim_after_frames: None,
            final_text: Some("mock transcript".into()),
            finalize_delay: Duration::ZERO,
            fail_stream: None,
        }
    }
}

/// Shared view into what the adapter received, for assertions.
#[derive(Default)]
pub struct MockSttProbe {
    pub samples: Mutex<Vec<i16>>,
    pub opens: AtomicU64,
}

impl MockSttProbe {
    pub fn open_count(&self) -> u64 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<i16> {
        self.samples.lock().clone()
    }
}

pub struct MockSttAdapter {
    script: Mutex<MockSttScript>,
    probe: Arc<MockSttProbe>,
}

impl MockSttAdapter {
    pub fn new() -> Self {
        Self::scripted(MockSttScript::default()).0
    }

    pub fn scripted(script: MockSttScript) -> (Self, Arc<MockSttProbe>) {
        let probe = Arc::new(MockSttProbe::default());
        (
            Self {
                script: Mutex::new(script),
                probe: probe.clone(),
            },
            probe,
        )
    }

    /// Replace the script for the next opened session.
    pub fn set_script(&self, script: MockSttScript) {
        *self.script.lock() = script;
    }
}

impl Default for MockSttAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SttAdapter for MockSttAdapter {
    fn id(&self) -> &'static str {
        "mock.stt"
    }

    async fn open(
        &self,
        config: &AdapterConfig,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<SttSession, SttError> {
        let mut script = self.script.lock().clone();
        // config can pin the transcript without touching the script
        if let Some(text) = config.get("final_text").and_then(|v| v.as_str()) {
            script.final_text = Some(text.to_string());
        }
        let delay = config.u64_or("finalize_delay_ms", script.finalize_delay.as_millis() as u64);
        script.finalize_delay = Duration::from_millis(delay);

        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        let probe = self.probe.clone();
        let (input_tx, mut input_rx) = mpsc::channel::<SttInput>(64);

        let task = tokio::spawn(async move {
            let utterance_id = next_utterance_id();

            if let Some(failure) = script.fail_stream {
                let _ = events
                    .send(TranscriptEvent::Failed {
                        transient: failure == MockFailure::Transient,
                        message: "scripted stream failure".into(),
                    })
                    .await;
                return;
            }

            let mut frames_seen = 0usize;
            let mut interim_sent = false;
            while let Some(input) = input_rx.recv().await {
                match input {
                    SttInput::Frame(frame) => {
                        frames_seen += 1;
                        probe.samples.lock().extend_from_slice(&frame.samples);
                        if let Some((after, text)) = &script.interim_after_frames {
                            if !interim_sent && frames_seen >= *after {
                                interim_sent = true;
                                let _ = events
                                    .send(TranscriptEvent::Interim {
                                        utterance_id,
                                        text: text.clone(),
                                    })
                                    .await;
                            }
                        }
                    }
                    SttInput::End => {
                        if let Some(text) = script.final_text {
                            if !script.finalize_delay.is_zero() {
                                tokio::time::sleep(script.finalize_delay).await;
                            }
                            let _ = events
                                .send(TranscriptEvent::Final { utterance_id, text })
                                .await;
                        }
                        // final_text = None: stay silent so the caller's
                        // timeout path is reachable
                        return;
                    }
                }
            }
        });

        Ok(SttSession::new(input_tx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_audio::{AudioFrame, FRAME_SIZE_SAMPLES};

    fn frame(tag: i16) -> AudioFrame {
        AudioFrame {
            samples: vec![tag; FRAME_SIZE_SAMPLES],
            timestamp: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn final_arrives_after_end() {
        let (adapter, probe) = MockSttAdapter::scripted(MockSttScript {
            final_text: Some("bonjour".into()),
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::channel(8);
        let session = adapter.open(&AdapterConfig::new(), tx).await.unwrap();

        session.push(frame(1));
        session.push(frame(2));
        session.finish();

        match rx.recv().await {
            Some(TranscriptEvent::Final { text, .. }) => assert_eq!(text, "bonjour"),
            other => panic!("expected final, got {:?}", other),
        }
        assert_eq!(probe.received().len(), 2 * FRAME_SIZE_SAMPLES);
        assert_eq!(probe.open_count(), 1);
    }

    #[tokio::test]
    async fn silent_script_never_answers() {
        let (adapter, _probe) = MockSttAdapter::scripted(MockSttScript {
            final_text: None,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::channel(8);
        let session = adapter.open(&AdapterConfig::new(), tx).await.unwrap();
        session.finish();
        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(got, Ok(None) | Err(_)));
    }

    #[tokio::test]
    async fn scripted_failure_is_reported() {
        let (adapter, _probe) = MockSttAdapter::scripted(MockSttScript {
            fail_stream: Some(MockFailure::Transient),
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::channel(8);
        let _session = adapter.open(&AdapterConfig::new(), tx).await.unwrap();
        match rx.recv().await {
            Some(TranscriptEvent::Failed { transient, .. }) => assert!(transient),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
