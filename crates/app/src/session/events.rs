//! The session's single inbound event queue and the observer bus.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use parlance_audio::RawAudio;
use parlance_foundation::SessionState;
use parlance_llm::LlmEvent;
use parlance_stt::TranscriptEvent;
use parlance_tts::TtsEvent;

/// Everything the turn engine consumes, from every producer, in one queue.
///
/// Provider events carry the turn generation they belong to; events from a
/// generation the engine has already moved past are dropped as stale.
#[derive(Debug)]
pub enum SessionEvent {
    Frame(RawAudio),
    Discontinuity { gap: Duration },
    TransportClosed,
    Stt { turn: u64, event: TranscriptEvent },
    Llm { turn: u64, event: LlmEvent },
    Tts { turn: u64, event: TtsEvent },
    /// Text-mode input; enters the pipeline at the final-transcript point.
    UserText(String),
    Cancel,
}

/// Structured events published to observers (SSE clients, logs, tests).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PublishedEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    SpeechStarted,
    SpeechHeartbeat {
        duration_ms: u64,
    },
    SpeechEnded {
        duration_ms: u64,
    },
    InterimTranscript {
        text: String,
    },
    FinalTranscript {
        text: String,
    },
    AssistantSentence {
        text: String,
    },
    ToolInvoked {
        name: String,
    },
    TurnCompleted {
        user: String,
        assistant: String,
        interrupted: bool,
    },
    TurnDiscarded,
    BargeIn,
    Error {
        kind: String,
        message: String,
    },
    Closed,
}

/// Broadcast fan-out for published events. No subscribers is fine; slow
/// subscribers lag and skip.
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: PublishedEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Bridge one adapter's event receiver onto the session queue, tagging each
/// event with the turn generation it belongs to. Ends when the adapter
/// closes its sender or the session queue is gone.
pub fn spawn_forwarder<E, F>(
    mut rx: mpsc::Receiver<E>,
    tx: mpsc::Sender<SessionEvent>,
    map: F,
) -> JoinHandle<()>
where
    E: Send + 'static,
    F: Fn(E) -> SessionEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if tx.send(map(event)).await.is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwarder_tags_events() {
        let (adapter_tx, adapter_rx) = mpsc::channel(4);
        let (session_tx, mut session_rx) = mpsc::channel(4);
        spawn_forwarder(adapter_rx, session_tx, |e: TranscriptEvent| {
            SessionEvent::Stt { turn: 7, event: e }
        });

        adapter_tx
            .send(TranscriptEvent::Final {
                utterance_id: 1,
                text: "hi".into(),
            })
            .await
            .unwrap();

        match session_rx.recv().await {
            Some(SessionEvent::Stt { turn, .. }) => assert_eq!(turn, 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn publisher_tolerates_no_subscribers() {
        let publisher = EventPublisher::default();
        publisher.emit(PublishedEvent::SpeechStarted);
        assert_eq!(publisher.subscriber_count(), 0);
    }
}
