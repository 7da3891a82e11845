//! FitCraft Coach: the 12-step conversational onboarding.
//!
//! Each turn is stateless on the server side apart from what is persisted:
//! the conversation, its messages and the per-user flow state.

pub mod model;
pub mod prompts;
pub mod routes;
pub mod state;
pub mod turn;

pub use model::{Author, ConversationSession, Message, SessionStatus};
pub use routes::{CoachRouteState, coach_routes};
pub use state::{CoachStep, FlowState};
pub use turn::{TurnError, TurnOutcome, TurnProcessor, TurnRequest};
