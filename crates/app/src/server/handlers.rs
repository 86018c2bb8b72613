use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Response;
use axum::Json;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::server::{ApiError, AppState};
use crate::session::SessionEvent;
use crate::transport::ws::run_ws_transport;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
pub struct TransportDescriptor {
    pub kind: &'static str,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub transport: TransportDescriptor,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let handle = state.manager.create(&body.agent_id)?;
    Ok(Json(CreateSessionResponse {
        session_id: handle.id,
        transport: TransportDescriptor {
            kind: "websocket",
            url: format!("/sessions/{}/audio", handle.id),
        },
    }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.manager.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// Text-mode input; the pipeline runs from the final-transcript point.
pub async fn post_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TextRequest>,
) -> Result<StatusCode, ApiError> {
    let handle = state.manager.get(id)?;
    handle.send(SessionEvent::UserText(body.text)).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Read-only observer stream of structured session events.
pub async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let handle = state.manager.get(id)?;
    let stream = BroadcastStream::new(handle.subscribe()).filter_map(|item| match item {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(err) => {
                tracing::warn!(error = %err, "unserializable published event");
                None
            }
        },
        // lagged subscriber: skip and keep streaming
        Err(err) => {
            tracing::debug!(error = %err, "sse subscriber lagged");
            None
        }
    });

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("ping")))
}

/// Attach the websocket audio transport to an existing session.
pub async fn ws_audio(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let handle = state.manager.get(id)?;
    let outbound_rx = handle.take_outbound()?;
    let events_tx = handle.events_tx();
    Ok(upgrade.on_upgrade(move |socket| run_ws_transport(socket, events_tx, outbound_rx)))
}
