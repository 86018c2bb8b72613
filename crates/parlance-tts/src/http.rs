//! HTTP streaming synthesis adapter.
//!
//! One request per sentence chunk against an endpoint that answers with raw
//! S16LE PCM in a chunked body, the shape most self-hosted speech servers
//! expose. The configured `sample_rate` describes the provider's output;
//! the frame pipeline adapts it downstream.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parlance_foundation::{AdapterConfig, AdapterConfigExt, TtsError};

use crate::adapter::{TtsAdapter, TtsSession, TtsText};
use crate::types::TtsEvent;

pub struct HttpTtsAdapter {
    client: reqwest::Client,
}

impl HttpTtsAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTtsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsAdapter for HttpTtsAdapter {
    fn id(&self) -> &'static str {
        "http.tts"
    }

    async fn open(
        &self,
        config: &AdapterConfig,
        events: mpsc::Sender<TtsEvent>,
        cancel: CancellationToken,
    ) -> Result<TtsSession, TtsError> {
        let url = config.str_or("url", "").to_string();
        if url.is_empty() {
            return Err(TtsError::OpenFailed("http.tts requires 'url'".into()));
        }
        let sample_rate = config.u64_or("sample_rate", 24_000) as u32;
        let voice = config
            .get("voice")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let client = self.client.clone();

        let (text_tx, mut text_rx) = mpsc::channel::<TtsText>(64);

        let task = tokio::spawn(async move {
            loop {
                let input = tokio::select! {
                    i = text_rx.recv() => i,
                    _ = cancel.cancelled() => {
                        let _ = events.send(TtsEvent::End).await;
                        return;
                    }
                };
                match input {
                    Some(TtsText::Push(text)) => {
                        let mut body = json!({ "text": text });
                        if let Some(v) = &voice {
                            body["voice"] = json!(v);
                        }
                        let response = tokio::select! {
                            r = client.post(&url).json(&body).send() => r,
                            _ = cancel.cancelled() => {
                                let _ = events.send(TtsEvent::End).await;
                                return;
                            }
                        };
                        let response = match response {
                            Ok(r) if r.status().is_success() => r,
                            Ok(r) => {
                                let _ = events
                                    .send(TtsEvent::Failed {
                                        message: format!("provider returned {}", r.status()),
                                    })
                                    .await;
                                return;
                            }
                            Err(err) => {
                                let _ = events
                                    .send(TtsEvent::Failed {
                                        message: err.to_string(),
                                    })
                                    .await;
                                return;
                            }
                        };
                        let mut stream = response.bytes_stream();
                        loop {
                            let chunk = tokio::select! {
                                c = stream.next() => c,
                                _ = cancel.cancelled() => {
                                    let _ = events.send(TtsEvent::End).await;
                                    return;
                                }
                            };
                            match chunk {
                                Some(Ok(bytes)) => {
                                    if events
                                        .send(TtsEvent::Audio {
                                            pcm: bytes.to_vec(),
                                            sample_rate,
                                        })
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                                Some(Err(err)) => {
                                    let _ = events
                                        .send(TtsEvent::Failed {
                                            message: format!("stream: {err}"),
                                        })
                                        .await;
                                    return;
                                }
                                None => break,
                            }
                        }
                    }
                    Some(TtsText::Finish) | None => {
                        let _ = events.send(TtsEvent::End).await;
                        return;
                    }
                }
            }
        });

        Ok(TtsSession::new(text_tx, task))
    }
}
