//! REST endpoint for workout generation.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use super::generator::WorkoutGenerator;
use super::model::WorkoutRequest;
use crate::error::ApiError;
use crate::http::data;

#[derive(Clone)]
pub struct WorkoutRouteState {
    pub generator: Arc<WorkoutGenerator>,
}

/// POST /api/workouts/generate
async fn generate(
    State(state): State<WorkoutRouteState>,
    body: Result<Json<WorkoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "WORKOUT_GENERATION_FAILED", e.body_text())
    })?;

    let outcome = state.generator.generate(request).await.map_err(|e| {
        tracing::error!(error = %e, "Workout generation failed");
        ApiError::from(e)
    })?;
    Ok(data(outcome))
}

pub fn workout_routes(state: WorkoutRouteState) -> Router {
    Router::new()
        .route("/api/workouts/generate", post(generate))
        .with_state(state)
}
