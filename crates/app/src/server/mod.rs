//! HTTP control surface.

pub mod handlers;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::sync::Arc;

use parlance_foundation::{OrchestratorError, TransportError};

use crate::session::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

pub fn router(manager: Arc<SessionManager>) -> Router {
    Router::new()
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/:id", delete(handlers::delete_session))
        .route("/sessions/:id/text", post(handlers::post_text))
        .route("/sessions/:id/events", get(handlers::session_events))
        .route("/sessions/:id/audio", get(handlers::ws_audio))
        .with_state(AppState { manager })
}

/// JSON error body with a status derived from the error kind.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match &err {
            OrchestratorError::SessionNotFound(_) | OrchestratorError::AgentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            OrchestratorError::Transport(TransportError::AlreadyAttached(_)) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}
