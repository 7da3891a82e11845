//! Coach flow state machine: the 12 fixed steps and the per-user progress row.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of steps in the coach flow.
pub const STEP_COUNT: u8 = 12;

/// Step number reported once the flow has finished (one past the table).
pub const FINISHED_STEP: u8 = STEP_COUNT + 1;

/// The steps of the FitCraft Coach onboarding dialogue, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachStep {
    Goals,
    FitnessLevel,
    Equipment,
    DurationAndFrequency,
    Limitations,
    TargetAreas,
    Schedule,
    Nutrition,
    WorkoutTypes,
    Lifestyle,
    Motivation,
    Summary,
}

impl CoachStep {
    /// All steps in flow order.
    pub const ALL: [CoachStep; STEP_COUNT as usize] = [
        CoachStep::Goals,
        CoachStep::FitnessLevel,
        CoachStep::Equipment,
        CoachStep::DurationAndFrequency,
        CoachStep::Limitations,
        CoachStep::TargetAreas,
        CoachStep::Schedule,
        CoachStep::Nutrition,
        CoachStep::WorkoutTypes,
        CoachStep::Lifestyle,
        CoachStep::Motivation,
        CoachStep::Summary,
    ];

    /// Look up a step by its 1-based number. Anything outside 1..=12 is `None`.
    pub fn from_number(number: u8) -> Option<CoachStep> {
        match number {
            1..=STEP_COUNT => Some(Self::ALL[usize::from(number) - 1]),
            _ => None,
        }
    }

    /// 1-based step number.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    /// Whether this is the last step of the flow.
    pub fn is_last(self) -> bool {
        matches!(self, Self::Summary)
    }

    /// Step-specific guidance for the coach.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Goals => {
                "You are FitCraft Coach, a friendly AI fitness trainer. Ask about their main fitness goals (lose weight, build muscle, improve endurance, etc.). Keep responses conversational and encouraging."
            }
            Self::FitnessLevel => {
                "Ask about their current fitness level (beginner, intermediate, advanced) and any previous workout experience."
            }
            Self::Equipment => {
                "Inquire about available equipment (dumbbells, resistance bands, bodyweight only, gym access, etc.)."
            }
            Self::DurationAndFrequency => {
                "Ask about their preferred workout duration and frequency per week."
            }
            Self::Limitations => {
                "Discuss any injuries, limitations, or health conditions they need to consider."
            }
            Self::TargetAreas => {
                "Ask about their target body areas and specific muscle groups they want to focus on."
            }
            Self::Schedule => "Inquire about their preferred workout times and schedule.",
            Self::Nutrition => "Discuss their nutrition goals and dietary preferences.",
            Self::WorkoutTypes => {
                "Ask about their experience level with different workout types (HIIT, strength training, yoga, etc.)."
            }
            Self::Lifestyle => {
                "Gather information about their lifestyle and activity level outside of workouts."
            }
            Self::Motivation => {
                "Ask about their motivation and what keeps them committed to fitness."
            }
            Self::Summary => {
                "Summarize their profile and provide personalized recommendations for their fitness journey."
            }
        }
    }
}

impl std::fmt::Display for CoachStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Goals => "goals",
            Self::FitnessLevel => "fitness_level",
            Self::Equipment => "equipment",
            Self::DurationAndFrequency => "duration_and_frequency",
            Self::Limitations => "limitations",
            Self::TargetAreas => "target_areas",
            Self::Schedule => "schedule",
            Self::Nutrition => "nutrition",
            Self::WorkoutTypes => "workout_types",
            Self::Lifestyle => "lifestyle",
            Self::Motivation => "motivation",
            Self::Summary => "summary",
        };
        write!(f, "{s}")
    }
}

/// Result of a successful advance from one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    /// Step number to report to the caller (13 once finished).
    pub next_step: u8,
    pub completed: bool,
}

impl Advance {
    /// Advance by one from `step`. Completing the last step reports 13.
    pub fn from(step: CoachStep) -> Self {
        Self {
            next_step: step.number() + 1,
            completed: step.is_last(),
        }
    }
}

/// Persisted per-user progress through the coach flow.
///
/// One logical row per user. Each successful turn replaces it with the value
/// returned by [`FlowState::advanced`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub user_id: String,
    /// 1..=12 while in progress, 13 once finished.
    pub current_step: u8,
    /// Raw answer text keyed by the step it was given at.
    pub step_answers: BTreeMap<u8, String>,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl FlowState {
    /// A fresh flow positioned at step 1.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            current_step: 1,
            step_answers: BTreeMap::new(),
            completed: false,
            updated_at: Utc::now(),
        }
    }

    /// Produce the state after a successful turn at `step`.
    ///
    /// Answers are layered: the stored answers, then the caller's accumulated
    /// `step_data`, then the new answer for `step`. The step never moves
    /// backwards and `completed` never resets.
    pub fn advanced(
        &self,
        step: CoachStep,
        step_data: &BTreeMap<u8, String>,
        answer: &str,
    ) -> FlowState {
        let advance = Advance::from(step);

        let mut step_answers = self.step_answers.clone();
        step_answers.extend(step_data.iter().map(|(k, v)| (*k, v.clone())));
        step_answers.insert(step.number(), answer.to_string());

        FlowState {
            user_id: self.user_id.clone(),
            current_step: self.current_step.max(advance.next_step).min(FINISHED_STEP),
            step_answers,
            completed: self.completed || advance.completed,
            updated_at: Utc::now(),
        }
    }
}
