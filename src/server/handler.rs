//! HTTP and websocket routes of the UI server

use std::panic::{catch_unwind, AssertUnwindSafe};

use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::{socket, CommandRequest, ServerState};
use crate::common::{error::ErrorBody, Error};
use crate::session::FrameEvent;

/// Error rendered as `{code, message}` with a status matching its origin
pub(super) struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

pub(super) async fn websocket(
    State(state): State<ServerState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |stream| socket::deliver(stream, state.queue, state.connections))
}

pub(super) async fn command(
    State(state): State<ServerState>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let request: CommandRequest = serde_json::from_str(&body).map_err(Error::from)?;
    tracing::debug!("Command received: {}", request.command);

    let handler = state.handler.read().clone();
    let Some(handler) = handler else {
        return Err(Error::Server("No session is accepting commands".to_string()).into());
    };

    match catch_unwind(AssertUnwindSafe(|| handler(request))) {
        Ok(Ok(())) => Ok(StatusCode::NO_CONTENT),
        Ok(Err(e)) => {
            if e.is_client_error() {
                tracing::warn!("Rejected command: {}", e);
            } else {
                tracing::error!("Command failed: {}", e);
            }
            Err(e.into())
        }
        Err(_) => {
            tracing::error!("Command handler panicked");
            Err(Error::Internal("command handler panicked".to_string()).into())
        }
    }
}

pub(super) async fn steps(State(state): State<ServerState>) -> Response {
    let view = state.view.read().clone();
    match view {
        Some(view) => Json(view.snapshot()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub(super) async fn config(State(state): State<ServerState>) -> Response {
    Json(state.config.as_ref().clone()).into_response()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EventBatch {
    One(FrameEvent),
    Many(Vec<FrameEvent>),
}

pub(super) async fn post_events(
    State(state): State<ServerState>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let events = match serde_json::from_str::<EventBatch>(&body).map_err(Error::from)? {
        EventBatch::One(event) => vec![event],
        EventBatch::Many(events) => events,
    };

    let view = state.view.read().clone();
    match view {
        Some(view) => {
            for event in events {
                view.record_event(event);
            }
        }
        None => tracing::debug!("Dropping {} event(s), no session attached", events.len()),
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn get_events(State(state): State<ServerState>) -> Response {
    let view = state.view.read().clone();
    let events = view.map(|view| view.events()).unwrap_or_default();
    Json(events).into_response()
}

pub(super) async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
