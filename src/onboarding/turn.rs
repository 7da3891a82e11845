//! TurnProcessor: one user message in, one coach reply out.
//!
//! A turn records the inbound message, asks the completion API for a reply
//! shaped by the current step, records the reply and advances the flow.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CoachConfig;
use crate::error::{ApiError, DatabaseError, LlmError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::{Database, SessionUpdate};

use super::model::{Author, ConversationSession, Message, SessionStatus};
use super::prompts::coach_system_prompt;
use super::state::{Advance, CoachStep, FlowState, STEP_COUNT};

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Inbound turn. Snake_case on the wire, like [`TurnOutcome`].
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    /// Kept wide so out-of-range values reach validation instead of failing to parse.
    #[serde(default = "first_step")]
    pub current_step: i64,
    #[serde(default)]
    pub step_data: BTreeMap<u8, String>,
}

fn first_step() -> i64 {
    1
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub response: String,
    pub conversation_id: Uuid,
    pub current_step: u8,
    pub completed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),

    #[error("AI service error: {0}")]
    Llm(#[from] LlmError),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        let status = match &err {
            TurnError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TurnError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            TurnError::Llm(_) | TurnError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, "FITCRAFT_AI_CHAT_FAILED", err.to_string())
    }
}

/// Drives the coach dialogue.
pub struct TurnProcessor {
    db: Arc<dyn Database>,
    llm: Arc<dyn LlmProvider>,
    config: CoachConfig,
}

impl TurnProcessor {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>, config: CoachConfig) -> Self {
        Self { db, llm, config }
    }

    /// Process one turn.
    ///
    /// Nothing is written until the request validates. If the completion
    /// fails, the user message has already been recorded and the flow does
    /// not advance.
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnOutcome, TurnError> {
        let step = validate(&request)?;
        let user_id = request.user_id.trim();

        let session = self.resolve_session(user_id, request.conversation_id).await?;

        self.db
            .append_message(&Message::new(
                session.id,
                Author::User,
                request.message.as_str(),
                step.number(),
            ))
            .await?;

        let flow = self
            .db
            .get_flow_state(user_id)
            .await?
            .unwrap_or_else(|| FlowState::new(user_id));

        let mut context = flow.step_answers.clone();
        context.extend(request.step_data.iter().map(|(k, v)| (*k, v.clone())));

        let completion = CompletionRequest::new(vec![
            ChatMessage::system(coach_system_prompt(step, &context, &request.message)),
            ChatMessage::user(request.message.as_str()),
        ])
        .with_max_tokens(self.config.max_tokens)
        .with_temperature(self.config.temperature);

        let reply = match self.llm.complete(completion).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => {
                let e = LlmError::EmptyCompletion {
                    provider: self.llm.model_name().to_string(),
                };
                warn!(user_id, step = step.number(), error = %e, "Coach completion failed");
                return Err(e.into());
            }
            Err(e) => {
                warn!(user_id, step = step.number(), error = %e, "Coach completion failed");
                return Err(e.into());
            }
        };

        self.db
            .append_message(&Message::new(
                session.id,
                Author::Assistant,
                reply.as_str(),
                step.number(),
            ))
            .await?;

        let next = flow.advanced(step, &request.step_data, &request.message);
        let advance = Advance::from(step);

        self.db
            .update_conversation(
                session.id,
                &SessionUpdate {
                    message_count: session.message_count.saturating_add(2),
                    last_message_at: Utc::now(),
                    status: if advance.completed {
                        SessionStatus::Completed
                    } else {
                        session.status
                    },
                },
            )
            .await?;
        self.db.save_flow_state(&next).await?;

        info!(
            user_id,
            conversation_id = %session.id,
            step = step.number(),
            next_step = advance.next_step,
            completed = advance.completed,
            "Coach turn complete"
        );

        Ok(TurnOutcome {
            response: reply,
            conversation_id: session.id,
            current_step: advance.next_step,
            completed: advance.completed,
        })
    }

    /// Current flow state for a user; a fresh step-1 state if none is stored.
    pub async fn flow_state(&self, user_id: &str) -> Result<FlowState, TurnError> {
        Ok(self
            .db
            .get_flow_state(user_id)
            .await?
            .unwrap_or_else(|| FlowState::new(user_id)))
    }

    /// Messages of a conversation, in the order they were written.
    pub async fn conversation_messages(&self, id: Uuid) -> Result<Vec<Message>, TurnError> {
        if self.db.get_conversation(id).await?.is_none() {
            return Err(TurnError::ConversationNotFound(id));
        }
        Ok(self.db.list_messages(id).await?)
    }

    async fn resolve_session(
        &self,
        user_id: &str,
        conversation_id: Option<Uuid>,
    ) -> Result<ConversationSession, TurnError> {
        match conversation_id {
            Some(id) => match self.db.get_conversation(id).await? {
                Some(session) if session.user_id == user_id => Ok(session),
                _ => Err(TurnError::ConversationNotFound(id)),
            },
            None => {
                let session = ConversationSession::new(user_id);
                self.db.create_conversation(&session).await?;
                info!(user_id, conversation_id = %session.id, "Created coach session");
                Ok(session)
            }
        }
    }
}

fn validate(request: &TurnRequest) -> Result<CoachStep, TurnError> {
    if request.message.trim().is_empty() {
        return Err(TurnError::InvalidInput("Message is required".to_string()));
    }
    if request.user_id.trim().is_empty() {
        return Err(TurnError::InvalidInput("User ID is required".to_string()));
    }
    if request.message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(TurnError::InvalidInput(format!(
            "Message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    u8::try_from(request.current_step)
        .ok()
        .and_then(CoachStep::from_number)
        .ok_or_else(|| {
            TurnError::InvalidInput(format!(
                "Step must be between 1 and {STEP_COUNT}, got {}",
                request.current_step
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::llm::stub::StubLlm;
    use crate::onboarding::state::FINISHED_STEP;
    use crate::store::LibSqlBackend;

    async fn setup(llm: StubLlm) -> (TurnProcessor, Arc<LibSqlBackend>, Arc<StubLlm>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let llm = Arc::new(llm);
        let processor = TurnProcessor::new(db.clone(), llm.clone(), CoachConfig::default());
        (processor, db, llm)
    }

    fn turn(message: &str, user_id: &str, step: i64) -> TurnRequest {
        TurnRequest {
            message: message.to_string(),
            user_id: user_id.to_string(),
            conversation_id: None,
            current_step: step,
            step_data: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn first_turn_creates_session_and_advances() {
        let (processor, db, llm) = setup(StubLlm::replying("Great goal! How active are you?")).await;

        let outcome = processor
            .process_turn(turn("I want to lose weight", "u1", 1))
            .await
            .unwrap();

        assert_eq!(outcome.current_step, 2);
        assert!(!outcome.completed);
        assert_eq!(outcome.response, "Great goal! How active are you?");

        let session = db.get_conversation(outcome.conversation_id).await.unwrap().unwrap();
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.title, "FitCraft Coach Session");
        assert_eq!(session.message_count, 2);
        assert!(session.last_message_at.is_some());

        let messages = db.list_messages(outcome.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].author, Author::User);
        assert_eq!(messages[0].step_at_time, 1);
        assert_eq!(messages[1].author, Author::Assistant);

        let flow = db.get_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(flow.current_step, 2);
        assert_eq!(flow.step_answers[&1], "I want to lose weight");

        let request = llm.last_request().unwrap();
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("step 1 of a 12-step"));
        assert_eq!(request.messages[1].content, "I want to lose weight");
    }

    #[tokio::test]
    async fn every_step_reports_next_and_completion() {
        let (processor, db, _llm) = setup(StubLlm::replying("ok")).await;

        let first = processor.process_turn(turn("start", "u1", 1)).await.unwrap();
        let conversation_id = first.conversation_id;

        for step in 2..=i64::from(STEP_COUNT) {
            let outcome = processor
                .process_turn(TurnRequest {
                    conversation_id: Some(conversation_id),
                    ..turn("answer", "u1", step)
                })
                .await
                .unwrap();
            assert_eq!(i64::from(outcome.current_step), step + 1);
            assert_eq!(outcome.completed, step == 12);
            assert_eq!(outcome.conversation_id, conversation_id);
        }

        let flow = db.get_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(flow.current_step, FINISHED_STEP);
        assert!(flow.completed);
        assert_eq!(flow.step_answers.len(), 12);

        let session = db.get_conversation(conversation_id).await.unwrap().unwrap();
        assert_eq!(session.message_count, 24);
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn new_session_after_finishing_stays_active() {
        let (processor, db, _llm) = setup(StubLlm::replying("ok")).await;

        let last = processor.process_turn(turn("wrap up", "u1", 12)).await.unwrap();
        assert!(last.completed);
        let finished = db.get_conversation(last.conversation_id).await.unwrap().unwrap();
        assert_eq!(finished.status, SessionStatus::Completed);

        let restart = processor.process_turn(turn("again", "u1", 1)).await.unwrap();
        assert_ne!(restart.conversation_id, last.conversation_id);
        assert_eq!(restart.current_step, 2);
        assert!(!restart.completed);

        let session = db.get_conversation(restart.conversation_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);

        // Per-user progress keeps its high-water mark.
        let flow = db.get_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(flow.current_step, FINISHED_STEP);
        assert!(flow.completed);
    }

    #[tokio::test]
    async fn failed_completion_keeps_user_message_and_step() {
        let (processor, db, _llm) = setup(StubLlm::replying("hello")).await;
        let first = processor.process_turn(turn("hi", "u1", 1)).await.unwrap();

        let failing = TurnProcessor::new(
            db.clone(),
            Arc::new(StubLlm::failing("upstream down")),
            CoachConfig::default(),
        );
        let err = failing
            .process_turn(TurnRequest {
                conversation_id: Some(first.conversation_id),
                ..turn("intermediate", "u1", 2)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::Llm(_)));

        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code, "FITCRAFT_AI_CHAT_FAILED");

        // The inbound message is recorded even though the turn failed.
        let messages = db.list_messages(first.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "intermediate");
        assert_eq!(messages[2].author, Author::User);
        assert_eq!(messages[2].step_at_time, 2);

        let flow = db.get_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(flow.current_step, 2);
        assert!(!flow.step_answers.contains_key(&2));

        let session = db.get_conversation(first.conversation_id).await.unwrap().unwrap();
        assert_eq!(session.message_count, 2);
    }

    #[tokio::test]
    async fn empty_completion_is_an_upstream_error() {
        let (processor, db, _llm) = setup(StubLlm::replying("   ")).await;
        let err = processor.process_turn(turn("hi", "u1", 1)).await.unwrap_err();
        assert!(matches!(err, TurnError::Llm(LlmError::EmptyCompletion { .. })));
        assert!(db.get_flow_state("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_input_makes_no_calls_and_writes_nothing() {
        let (processor, db, llm) = setup(StubLlm::replying("unused")).await;

        let cases = vec![
            turn("", "u1", 1),
            turn("   ", "u1", 1),
            turn("hello", "", 1),
            turn(&"x".repeat(MAX_MESSAGE_CHARS + 1), "u1", 1),
            turn("hello", "u1", 0),
            turn("hello", "u1", 13),
            turn("hello", "u1", -4),
            turn("hello", "u1", 300),
        ];
        for request in cases {
            let err = processor.process_turn(request).await.unwrap_err();
            assert!(matches!(err, TurnError::InvalidInput(_)), "got {err:?}");
            let api: ApiError = err.into();
            assert_eq!(api.status, StatusCode::BAD_REQUEST);
        }

        assert_eq!(llm.calls(), 0);
        assert!(db.get_flow_state("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn message_at_length_limit_is_accepted() {
        let (processor, _db, _llm) = setup(StubLlm::replying("ok")).await;
        let outcome = processor
            .process_turn(turn(&"é".repeat(MAX_MESSAGE_CHARS), "u1", 1))
            .await
            .unwrap();
        assert_eq!(outcome.current_step, 2);
    }

    #[tokio::test]
    async fn unknown_or_foreign_conversation_is_not_found() {
        let (processor, _db, llm) = setup(StubLlm::replying("ok")).await;

        let missing = Uuid::new_v4();
        let err = processor
            .process_turn(TurnRequest {
                conversation_id: Some(missing),
                ..turn("hi", "u1", 1)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::ConversationNotFound(id) if id == missing));

        let owned = processor.process_turn(turn("hi", "owner", 1)).await.unwrap();
        let err = processor
            .process_turn(TurnRequest {
                conversation_id: Some(owned.conversation_id),
                ..turn("hi", "intruder", 1)
            })
            .await
            .unwrap_err();
        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn step_data_layers_over_stored_answers() {
        let (processor, db, llm) = setup(StubLlm::replying("ok")).await;
        processor
            .process_turn(turn("stored goal", "u1", 1))
            .await
            .unwrap();

        let mut step_data = BTreeMap::new();
        step_data.insert(1, "client goal".to_string());
        processor
            .process_turn(TurnRequest {
                step_data,
                ..turn("beginner", "u1", 2)
            })
            .await
            .unwrap();

        let flow = db.get_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(flow.step_answers[&1], "client goal");
        assert_eq!(flow.step_answers[&2], "beginner");

        let system = &llm.last_request().unwrap().messages[0].content;
        assert!(system.contains(r#"{"1":"client goal"}"#));
    }

    #[tokio::test]
    async fn request_and_outcome_share_snake_case_fields() {
        let request: TurnRequest = serde_json::from_value(serde_json::json!({
            "message": "hi",
            "user_id": "u1",
            "current_step": 3,
            "step_data": {"1": "goal", "2": "level"}
        }))
        .unwrap();
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.current_step, 3);
        assert_eq!(request.step_data[&2], "level");

        let defaulted: TurnRequest =
            serde_json::from_value(serde_json::json!({"message": "hi", "user_id": "u1"})).unwrap();
        assert_eq!(defaulted.current_step, 1);
        assert!(defaulted.conversation_id.is_none());

        let camel: TurnRequest =
            serde_json::from_value(serde_json::json!({"message": "hi", "userId": "u1"})).unwrap();
        assert!(camel.user_id.is_empty());

        let outcome = TurnOutcome {
            response: "r".to_string(),
            conversation_id: Uuid::nil(),
            current_step: 2,
            completed: false,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["completed", "conversation_id", "current_step", "response"]);
    }

    #[tokio::test]
    async fn flow_state_defaults_to_first_step() {
        let (processor, _db, _llm) = setup(StubLlm::replying("ok")).await;
        let state = processor.flow_state("nobody").await.unwrap();
        assert_eq!(state.current_step, 1);
        assert!(!state.completed);
    }

    #[tokio::test]
    async fn conversation_messages_requires_existing_session() {
        let (processor, _db, _llm) = setup(StubLlm::replying("ok")).await;
        let err = processor
            .conversation_messages(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::ConversationNotFound(_)));

        let outcome = processor.process_turn(turn("hi", "u1", 1)).await.unwrap();
        let messages = processor
            .conversation_messages(outcome.conversation_id)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
    }
}
