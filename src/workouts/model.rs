//! Workout generation request, generated plan, and stored record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured profile a workout is generated from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutRequest {
    #[serde(default, alias = "user_id")]
    pub user_id: String,
    #[serde(default, alias = "workout_type")]
    pub workout_type: String,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default, alias = "fitness_level")]
    pub fitness_level: Option<String>,
    #[serde(default, alias = "body_type")]
    pub body_type: Option<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default, alias = "target_muscles")]
    pub target_muscles: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub injuries: Option<String>,
}

/// A number as the model wrote it: `12`, `2.5`, `"10-12"` or `"60 seconds"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Count(u32),
    Number(f64),
    Text(String),
}

impl Quantity {
    /// Best-effort whole number. Fractions round; text yields its leading digits.
    pub fn whole(&self) -> Option<u32> {
        match self {
            Quantity::Count(n) => Some(*n),
            Quantity::Number(f) if f.is_finite() && *f >= 0.0 && *f <= f64::from(u32::MAX) => {
                Some(f.round() as u32)
            }
            Quantity::Number(_) => None,
            Quantity::Text(text) => {
                let digits: String = text
                    .trim()
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                digits.parse().ok()
            }
        }
    }
}

/// A single exercise within a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<Quantity>,
    /// Rest between sets, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<Quantity>,
    /// Work duration, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifications: Option<String>,
}

/// One phase (warm-up, main, cool-down).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Quantity>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

/// The phases of a generated workout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPhases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warm_up: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_workout: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cool_down: Option<Phase>,
}

impl WorkoutPhases {
    pub fn count(&self) -> usize {
        [&self.warm_up, &self.main_workout, &self.cool_down]
            .iter()
            .filter(|p| p.is_some())
            .count()
    }
}

/// A workout plan as produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedWorkout {
    #[serde(default)]
    pub workout_name: String,
    #[serde(default)]
    pub workout_type: Option<String>,
    #[serde(default)]
    pub estimated_duration: Option<Quantity>,
    #[serde(default)]
    pub difficulty_level: Option<String>,
    #[serde(default)]
    pub target_muscles: Vec<String>,
    #[serde(default)]
    pub phases: Option<WorkoutPhases>,
    #[serde(default)]
    pub coaching_tips: Vec<String>,
    #[serde(default)]
    pub progression_notes: Option<String>,
}

/// A workout row as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub workout_type: String,
    pub duration_minutes: Option<u32>,
    pub difficulty_level: Option<String>,
    pub target_muscles: Vec<String>,
    pub is_generated: bool,
    pub ai_model_used: Option<String>,
    pub status: String,
    /// Full generated plan.
    pub plan: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl WorkoutRecord {
    /// Build the stored row for a freshly generated plan.
    pub fn from_generated(
        user_id: &str,
        workout_type: &str,
        workout: &GeneratedWorkout,
        model: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            name: workout.workout_name.clone(),
            description: format!("AI-generated {workout_type} workout"),
            workout_type: workout_type.to_string(),
            duration_minutes: workout.estimated_duration.as_ref().and_then(Quantity::whole),
            difficulty_level: workout.difficulty_level.clone(),
            target_muscles: workout.target_muscles.clone(),
            is_generated: true,
            ai_model_used: Some(model.to_string()),
            status: "ready".to_string(),
            plan: serde_json::to_value(workout).unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_camel_and_snake_case() {
        let camel: WorkoutRequest = serde_json::from_value(serde_json::json!({
            "userId": "u1", "workoutType": "hiit", "fitnessLevel": "beginner"
        }))
        .unwrap();
        assert_eq!(camel.user_id, "u1");
        assert_eq!(camel.fitness_level.as_deref(), Some("beginner"));

        let snake: WorkoutRequest = serde_json::from_value(serde_json::json!({
            "user_id": "u2", "workout_type": "strength", "target_muscles": ["legs"]
        }))
        .unwrap();
        assert_eq!(snake.workout_type, "strength");
        assert_eq!(snake.target_muscles, vec!["legs"]);
    }

    #[test]
    fn quantity_accepts_counts_fractions_and_text() {
        let n: Quantity = serde_json::from_str("12").unwrap();
        assert_eq!(n, Quantity::Count(12));
        let f: Quantity = serde_json::from_str("2.5").unwrap();
        assert_eq!(f, Quantity::Number(2.5));
        let r: Quantity = serde_json::from_str("\"10-12\"").unwrap();
        assert_eq!(r, Quantity::Text("10-12".to_string()));
    }

    #[test]
    fn quantity_whole_is_best_effort() {
        assert_eq!(Quantity::Count(45).whole(), Some(45));
        assert_eq!(Quantity::Number(2.5).whole(), Some(3));
        assert_eq!(Quantity::Number(-1.0).whole(), None);
        assert_eq!(Quantity::Text("45 minutes".to_string()).whole(), Some(45));
        assert_eq!(Quantity::Text("about an hour".to_string()).whole(), None);
    }

    #[test]
    fn record_from_generated_marks_ai_origin() {
        let workout = GeneratedWorkout {
            workout_name: "Leg Day".to_string(),
            workout_type: Some("strength".to_string()),
            estimated_duration: Some(Quantity::Text("40 minutes".to_string())),
            difficulty_level: Some("beginner".to_string()),
            target_muscles: vec!["quads".to_string()],
            phases: Some(WorkoutPhases::default()),
            coaching_tips: vec![],
            progression_notes: None,
        };
        let record = WorkoutRecord::from_generated("u1", "strength", &workout, "model-x");
        assert_eq!(record.name, "Leg Day");
        assert_eq!(record.duration_minutes, Some(40));
        assert_eq!(record.description, "AI-generated strength workout");
        assert!(record.is_generated);
        assert_eq!(record.status, "ready");
        assert_eq!(record.plan["workoutName"], "Leg Day");
    }
}
