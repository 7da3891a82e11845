//! Workout generator: one completion call, validated JSON out, best-effort save.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::WorkoutConfig;
use crate::error::{ApiError, LlmError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::Database;

use super::model::{GeneratedWorkout, WorkoutRecord, WorkoutRequest};
use super::prompts::{WORKOUT_SYSTEM_PROMPT, workout_prompt};

/// Whether the generated workout made it into storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { workout_id: Uuid },
    NotSaved { reason: String },
}

/// A generated workout plus the outcome of persisting it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutcome {
    pub workout: GeneratedWorkout,
    pub saved: SaveOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkoutError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("AI service error: {0}")]
    Llm(#[from] LlmError),

    #[error("Failed to parse workout data: {0}")]
    Parse(String),

    #[error("Invalid workout structure from AI: {0}")]
    InvalidStructure(String),
}

impl From<WorkoutError> for ApiError {
    fn from(err: WorkoutError) -> Self {
        let status = match &err {
            WorkoutError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, "WORKOUT_GENERATION_FAILED", err.to_string())
    }
}

/// Generates structured workout plans.
pub struct WorkoutGenerator {
    db: Arc<dyn Database>,
    llm: Arc<dyn LlmProvider>,
    config: WorkoutConfig,
}

impl WorkoutGenerator {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>, config: WorkoutConfig) -> Self {
        Self { db, llm, config }
    }

    pub async fn generate(&self, request: WorkoutRequest) -> Result<GenerationOutcome, WorkoutError> {
        if request.user_id.trim().is_empty() || request.workout_type.trim().is_empty() {
            return Err(WorkoutError::InvalidInput(
                "UserId and workoutType are required".to_string(),
            ));
        }

        info!(
            user_id = %request.user_id,
            workout_type = %request.workout_type,
            duration = ?request.duration,
            "Generating workout"
        );

        let completion = CompletionRequest::new(vec![
            ChatMessage::system(WORKOUT_SYSTEM_PROMPT),
            ChatMessage::user(workout_prompt(&request)),
        ])
        .with_max_tokens(self.config.max_tokens)
        .with_temperature(self.config.temperature);

        let response = self.llm.complete(completion).await?;
        let workout = parse_workout(&response.content).inspect_err(|e| {
            warn!(error = %e, raw = %response.content, "Failed to parse generated workout");
        })?;

        let saved = self.save(&request, &workout).await;
        Ok(GenerationOutcome { workout, saved })
    }

    /// Persist the workout. Failures are logged and reported, never raised.
    async fn save(&self, request: &WorkoutRequest, workout: &GeneratedWorkout) -> SaveOutcome {
        let record = WorkoutRecord::from_generated(
            request.user_id.trim(),
            request.workout_type.trim(),
            workout,
            self.llm.model_name(),
        );
        match self.db.insert_workout(&record).await {
            Ok(()) => {
                info!(workout_id = %record.id, user_id = %record.user_id, "Workout saved");
                SaveOutcome::Saved {
                    workout_id: record.id,
                }
            }
            Err(e) => {
                warn!(error = %e, user_id = %record.user_id, "Failed to save workout");
                SaveOutcome::NotSaved {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Parse and validate a workout from raw model output.
pub fn parse_workout(raw: &str) -> Result<GeneratedWorkout, WorkoutError> {
    let json = extract_json_object(raw);
    let workout: GeneratedWorkout =
        serde_json::from_str(json).map_err(|e| WorkoutError::Parse(e.to_string()))?;

    if workout.workout_name.trim().is_empty() {
        return Err(WorkoutError::InvalidStructure(
            "missing workoutName".to_string(),
        ));
    }
    match &workout.phases {
        Some(phases) if phases.count() > 0 => Ok(workout),
        _ => Err(WorkoutError::InvalidStructure("no phases".to_string())),
    }
}

/// Extract a JSON object from model output that might be wrapped in markdown fences.
fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed;
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner;
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return &trimmed[start..=end];
        }
    }

    trimmed
}
