//! WebSocket audio binding.
//!
//! Binary frames carry 16 kHz mono S16LE PCM in chunks of at most 100 ms in
//! both directions; text frames carry JSON control messages. The ingest
//! side posts to the session queue, the egress side drains the outbound
//! frame channel, and a closed socket tears the session down.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

use parlance_audio::{
    AudioFrame, FrameEmitter, RawAudio, ResamplerQuality, CHANNELS_MONO, SAMPLE_RATE_HZ,
};

use crate::session::events::SessionEvent;
use crate::transport::TransportControl;

pub async fn run_ws_transport(
    socket: WebSocket,
    events_tx: mpsc::Sender<SessionEvent>,
    mut outbound_rx: mpsc::Receiver<AudioFrame>,
) {
    let (mut sink, mut stream) = socket.split();

    // egress: canonical frames back out at the transport rate
    let egress = tokio::spawn(async move {
        let mut emitter = match FrameEmitter::new(SAMPLE_RATE_HZ, ResamplerQuality::Balanced) {
            Ok(e) => e,
            Err(err) => {
                tracing::error!(error = %err, "outbound emitter unavailable");
                return;
            }
        };
        while let Some(frame) = outbound_rx.recv().await {
            let samples = match emitter.emit(&frame) {
                Ok(s) => s,
                Err(err) => {
                    tracing::warn!(error = %err, "outbound frame dropped");
                    continue;
                }
            };
            if samples.is_empty() {
                continue;
            }
            let bytes = RawAudio::to_le_bytes(&samples);
            if sink.send(Message::Binary(bytes)).await.is_err() {
                return;
            }
        }
    });

    // ingest: peer audio and control messages onto the session queue
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Binary(bytes)) => {
                let raw = RawAudio::from_le_bytes(&bytes, SAMPLE_RATE_HZ, CHANNELS_MONO);
                if events_tx.send(SessionEvent::Frame(raw)).await.is_err() {
                    break;
                }
            }
            Ok(Message::Text(body)) => match serde_json::from_str::<TransportControl>(&body) {
                Ok(TransportControl::Discontinuity { gap_ms }) => {
                    let event = SessionEvent::Discontinuity {
                        gap: Duration::from_millis(gap_ms),
                    };
                    if events_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "unparseable transport control message");
                }
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let _ = events_tx.send(SessionEvent::TransportClosed).await;
    egress.abort();
}
