//! Echo adapter: one byte of "audio" per byte of input text.
//!
//! Makes end-to-end assertions exact — the synthesized byte count equals
//! the response text length — while still exercising the streaming shape.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use parlance_foundation::{AdapterConfig, AdapterConfigExt, TtsError};

use crate::adapter::{TtsAdapter, TtsSession, TtsText};
use crate::types::TtsEvent;

pub struct EchoTtsAdapter;

#[async_trait]
impl TtsAdapter for EchoTtsAdapter {
    fn id(&self) -> &'static str {
        "echo.tts"
    }

    async fn open(
        &self,
        config: &AdapterConfig,
        events: mpsc::Sender<TtsEvent>,
        cancel: CancellationToken,
    ) -> Result<TtsSession, TtsError> {
        let sample_rate = config.u64_or("sample_rate", 16_000) as u32;
        // 0 = deliver each push as a single chunk
        let chunk_bytes = config.u64_or("chunk_bytes", 0) as usize;
        let chunk_delay = Duration::from_millis(config.u64_or("chunk_delay_ms", 0));
        let fail_after_chunks = config.get("fail_after_chunks").and_then(|v| v.as_u64());

        let (text_tx, mut text_rx) = mpsc::channel::<TtsText>(64);

        let task = tokio::spawn(async move {
            let mut chunks_sent = 0u64;
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
                        let bytes = text.into_bytes();
                        let step = if chunk_bytes == 0 { bytes.len().max(1) } else { chunk_bytes };
                        for piece in bytes.chunks(step) {
                            if let Some(limit) = fail_after_chunks {
                                if chunks_sent >= limit {
                                    let _ = events
                                        .send(TtsEvent::Failed {
                                            message: "scripted synthesis failure".into(),
                                        })
                                        .await;
                                    return;
                                }
                            }
                            if !chunk_delay.is_zero() {
                                tokio::select! {
                                    _ = tokio::time::sleep(chunk_delay) => {}
                                    _ = cancel.cancelled() => {
                                        let _ = events.send(TtsEvent::End).await;
                                        return;
                                    }
                                }
                            }
                            if cancel.is_cancelled() {
                                let _ = events.send(TtsEvent::End).await;
                                return;
                            }
                            chunks_sent += 1;
                            if events
                                .send(TtsEvent::Audio {
                                    pcm: piece.to_vec(),
                                    sample_rate,
                                })
                                .await
                                .is_err()
                            {
                                return;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn byte_count_matches_text_length() {
        let adapter = EchoTtsAdapter;
        let (tx, mut rx) = mpsc::channel(32);
        let session = adapter
            .open(&AdapterConfig::new(), tx, CancellationToken::new())
            .await
            .unwrap();

        session.push_text("Bonjour.".into());
        session.push_text(" Encore.".into());
        session.finish();

        let mut total = 0;
        loop {
            match rx.recv().await {
                Some(TtsEvent::Audio { pcm, .. }) => total += pcm.len(),
                Some(TtsEvent::End) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(total, "Bonjour. Encore.".len());
    }

    #[tokio::test]
    async fn cancellation_stops_chunking() {
        let adapter = EchoTtsAdapter;
        let cfg: AdapterConfig =
            serde_json::from_str(r#"{"chunk_bytes": 1, "chunk_delay_ms": 20}"#).unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let session = adapter.open(&cfg, tx, cancel.clone()).await.unwrap();

        session.push_text("a long sentence that will be cut".into());
        // let a few chunks through, then cancel
        let mut received = 0;
        while received < 3 {
            if let Some(TtsEvent::Audio { .. }) = rx.recv().await {
                received += 1;
            }
        }
        cancel.cancel();

        let mut ended = false;
        while let Ok(Some(ev)) =
            tokio::time::timeout(Duration::from_millis(300), rx.recv()).await
        {
            if matches!(ev, TtsEvent::End) {
                ended = true;
                break;
            }
        }
        assert!(ended, "cancelled session must confirm with End");
    }

    #[tokio::test]
    async fn scripted_failure_surfaces() {
        let adapter = EchoTtsAdapter;
        let cfg: AdapterConfig =
            serde_json::from_str(r#"{"chunk_bytes": 1, "fail_after_chunks": 2}"#).unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let session = adapter
            .open(&cfg, tx, CancellationToken::new())
            .await
            .unwrap();
        session.push_text("abcdef".into());

        let mut audio = 0;
        loop {
            match rx.recv().await {
                Some(TtsEvent::Audio { .. }) => audio += 1,
                Some(TtsEvent::Failed { .. }) => break,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(audio, 2);
    }
}
