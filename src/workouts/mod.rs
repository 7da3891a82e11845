//! AI workout generation.

pub mod generator;
pub mod model;
pub mod prompts;
pub mod routes;

pub use generator::{GenerationOutcome, SaveOutcome, WorkoutError, WorkoutGenerator};
pub use model::{GeneratedWorkout, Quantity, WorkoutRecord, WorkoutRequest};
pub use routes::{WorkoutRouteState, workout_routes};
