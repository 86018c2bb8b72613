//! Generic websocket STT binding.
//!
//! Speaks the simple protocol several self-hosted streaming recognizers
//! expose: binary frames of 16 kHz S16LE PCM in, JSON text messages out
//! (`{"type": "partial" | "final", "text": ...}`), `{"type": "end"}` to
//! close the audio side.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use parlance_audio::RawAudio;
use parlance_foundation::{AdapterConfig, AdapterConfigExt, SttError};

use crate::adapter::{SttAdapter, SttInput, SttSession};
use crate::types::{next_utterance_id, TranscriptEvent};

#[derive(Debug, Deserialize)]
struct WireTranscript {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

pub struct WsSttAdapter;

#[async_trait]
impl SttAdapter for WsSttAdapter {
    fn id(&self) -> &'static str {
        "websocket.stt"
    }

    async fn open(
        &self,
        config: &AdapterConfig,
        events: mpsc::Sender<TranscriptEvent>,
    ) -> Result<SttSession, SttError> {
        let url = config.str_or("url", "").to_string();
        if url.is_empty() {
            return Err(SttError::OpenFailed("websocket.stt requires 'url'".into()));
        }

        // Connection failures are transient: the turn engine retries once
        // with a fresh session.
        let (socket, _) = connect_async(&url)
            .await
            .map_err(|e| SttError::Transient(format!("connect {url}: {e}")))?;
        let (mut sink, mut stream) = socket.split();

        let (input_tx, mut input_rx) = mpsc::channel::<SttInput>(128);
        let utterance_id = next_utterance_id();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    input = input_rx.recv() => match input {
                        Some(SttInput::Frame(frame)) => {
                            let bytes = RawAudio::to_le_bytes(&frame.samples);
                            if let Err(err) = sink.send(Message::Binary(bytes)).await {
                                let _ = events.send(TranscriptEvent::Failed {
                                    transient: false,
                                    message: format!("send: {err}"),
                                }).await;
                                return;
                            }
                        }
                        Some(SttInput::End) => {
                            let _ = sink.send(Message::Text(r#"{"type":"end"}"#.into())).await;
                        }
                        None => return,
                    },
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(body))) => {
                            let parsed: WireTranscript = match serde_json::from_str(&body) {
                                Ok(p) => p,
                                Err(err) => {
                                    tracing::warn!(error = %err, "unparseable transcript message");
                                    continue;
                                }
                            };
                            let event = match parsed.kind.as_str() {
                                "partial" => TranscriptEvent::Interim {
                                    utterance_id,
                                    text: parsed.text,
                                },
                                "final" => TranscriptEvent::Final {
                                    utterance_id,
                                    text: parsed.text,
                                },
                                other => {
                                    tracing::debug!(kind = other, "ignoring transcript message");
                                    continue;
                                }
                            };
                            let is_final = matches!(event, TranscriptEvent::Final { .. });
                            if events.send(event).await.is_err() || is_final {
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = events.send(TranscriptEvent::Failed {
                                transient: true,
                                message: "provider closed the stream".into(),
                            }).await;
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            let _ = events.send(TranscriptEvent::Failed {
                                transient: false,
                                message: format!("stream: {err}"),
                            }).await;
                            return;
                        }
                    },
                }
            }
        });

        Ok(SttSession::new(input_tx, task))
    }
}
