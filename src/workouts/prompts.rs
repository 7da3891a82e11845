//! Workout generation prompt template.

use super::model::WorkoutRequest;

pub const DEFAULT_DURATION_MINUTES: u32 = 45;
pub const DEFAULT_FITNESS_LEVEL: &str = "intermediate";
pub const DEFAULT_BODY_TYPE: &str = "mesomorph";
pub const DEFAULT_EQUIPMENT: &str = "bodyweight";
pub const DEFAULT_TARGET_MUSCLES: &str = "full body";
pub const DEFAULT_GOALS: &str = "general fitness";
pub const DEFAULT_INJURIES: &str = "none";

pub const WORKOUT_SYSTEM_PROMPT: &str = "You are an expert personal trainer. Generate workout plans in valid JSON format only. No additional text or explanations.";

fn text_or<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => default,
    }
}

fn list_or(values: &[String], default: &str) -> String {
    if values.is_empty() {
        default.to_string()
    } else {
        values.join(", ")
    }
}

/// Render the user prompt for a workout request, filling defaults for absent fields.
pub fn workout_prompt(request: &WorkoutRequest) -> String {
    let workout_type = request.workout_type.trim();
    let duration = request.duration.unwrap_or(DEFAULT_DURATION_MINUTES);
    let fitness_level = text_or(request.fitness_level.as_deref(), DEFAULT_FITNESS_LEVEL);
    let body_type = text_or(request.body_type.as_deref(), DEFAULT_BODY_TYPE);
    let equipment = list_or(&request.equipment, DEFAULT_EQUIPMENT);
    let target_muscles = list_or(&request.target_muscles, DEFAULT_TARGET_MUSCLES);
    let goals = list_or(&request.goals, DEFAULT_GOALS);
    let injuries = text_or(request.injuries.as_deref(), DEFAULT_INJURIES);

    format!(
        r#"You are an expert personal trainer and exercise physiologist. Generate a comprehensive, personalized workout plan based on the following user profile:

**User Profile:**
- Workout Type: {workout_type}
- Duration: {duration} minutes
- Fitness Level: {fitness_level}
- Body Type: {body_type}
- Available Equipment: {equipment}
- Target Muscles: {target_muscles}
- Goals: {goals}
- Injuries/Limitations: {injuries}

**Requirements:**
1. Create a structured workout with warm-up, main workout, and cool-down phases
2. Include specific exercises with sets, reps, and rest periods
3. Provide detailed instructions for each exercise
4. Consider the user's fitness level and limitations
5. Ensure exercises match available equipment
6. Include modifications for different skill levels
7. Add coaching tips and progression notes

**Response Format (JSON):**
{{
  "workoutName": "Descriptive workout name",
  "workoutType": "{workout_type}",
  "estimatedDuration": {duration},
  "difficultyLevel": "{fitness_level}",
  "targetMuscles": ["list", "of", "target", "muscles"],
  "phases": {{
    "warmUp": {{
      "duration": 5,
      "exercises": [
        {{
          "name": "Exercise name",
          "duration": 60,
          "instructions": "Detailed instructions",
          "modifications": "Easier/harder variations"
        }}
      ]
    }},
    "mainWorkout": {{
      "duration": 30,
      "exercises": [
        {{
          "name": "Exercise name",
          "sets": 3,
          "reps": "10-12",
          "rest": 60,
          "equipment": ["required equipment"],
          "instructions": "Detailed form cues and technique",
          "modifications": "Progression and regression options"
        }}
      ]
    }},
    "coolDown": {{
      "duration": 10,
      "exercises": [
        {{
          "name": "Stretch/recovery exercise",
          "duration": 30,
          "instructions": "How to perform the stretch",
          "modifications": "Variations for flexibility levels"
        }}
      ]
    }}
  }},
  "coachingTips": [
    "Important tip 1",
    "Form cue 2",
    "Motivation point 3"
  ],
  "progressionNotes": "How to progress this workout over time"
}}

Generate a complete, safe, and effective workout plan. Respond only with valid JSON."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_profile_fields() {
        let request = WorkoutRequest {
            user_id: "u1".to_string(),
            workout_type: "hiit".to_string(),
            ..Default::default()
        };
        let prompt = workout_prompt(&request);
        assert!(prompt.contains("- Workout Type: hiit"));
        assert!(prompt.contains("- Duration: 45 minutes"));
        assert!(prompt.contains("- Fitness Level: intermediate"));
        assert!(prompt.contains("- Body Type: mesomorph"));
        assert!(prompt.contains("- Available Equipment: bodyweight"));
        assert!(prompt.contains("- Target Muscles: full body"));
        assert!(prompt.contains("- Goals: general fitness"));
        assert!(prompt.contains("- Injuries/Limitations: none"));
        assert!(prompt.contains(r#""estimatedDuration": 45,"#));
    }

    #[test]
    fn supplied_fields_are_rendered() {
        let request = WorkoutRequest {
            user_id: "u1".to_string(),
            workout_type: "strength".to_string(),
            duration: Some(30),
            fitness_level: Some("beginner".to_string()),
            body_type: Some("ectomorph".to_string()),
            equipment: vec!["dumbbells".to_string(), "bench".to_string()],
            target_muscles: vec!["chest".to_string()],
            goals: vec!["build muscle".to_string()],
            injuries: Some("bad knee".to_string()),
        };
        let prompt = workout_prompt(&request);
        assert!(prompt.contains("- Duration: 30 minutes"));
        assert!(prompt.contains("- Available Equipment: dumbbells, bench"));
        assert!(prompt.contains("- Injuries/Limitations: bad knee"));
        assert!(prompt.contains(r#""difficultyLevel": "beginner""#));
    }

    #[test]
    fn blank_optional_text_uses_default() {
        let request = WorkoutRequest {
            workout_type: "yoga".to_string(),
            injuries: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(workout_prompt(&request).contains("- Injuries/Limitations: none"));
    }
}
