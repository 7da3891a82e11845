//! REST endpoints for the coach dialogue.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use super::turn::{TurnProcessor, TurnRequest};
use crate::error::ApiError;
use crate::http::data;

const CODE: &str = "FITCRAFT_AI_CHAT_FAILED";

/// Shared state for coach routes.
#[derive(Clone)]
pub struct CoachRouteState {
    pub processor: Arc<TurnProcessor>,
}

/// POST /api/coach/chat
async fn chat(
    State(state): State<CoachRouteState>,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) =
        body.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, CODE, e.body_text()))?;

    let outcome = state.processor.process_turn(request).await.map_err(|e| {
        tracing::error!(error = %e, "Coach turn failed");
        ApiError::from(e)
    })?;
    Ok(data(outcome))
}

/// GET /api/coach/state/{user_id}
async fn flow_state(
    State(state): State<CoachRouteState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let flow = state.processor.flow_state(&user_id).await?;
    Ok(data(flow))
}

/// GET /api/coach/conversations/{id}/messages
async fn messages(
    State(state): State<CoachRouteState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, CODE, e.body_text()))?;
    let messages = state.processor.conversation_messages(id).await?;
    Ok(data(messages))
}

/// Build the coach routes.
pub fn coach_routes(state: CoachRouteState) -> Router {
    Router::new()
        .route("/api/coach/chat", post(chat))
        .route("/api/coach/state/{user_id}", get(flow_state))
        .route("/api/coach/conversations/{id}/messages", get(messages))
        .with_state(state)
}
