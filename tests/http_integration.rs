//! Integration tests for the FitCraft REST surface.
//!
//! Each test spins up the full router on a random port against an in-memory
//! libSQL store and a canned LLM, then talks to it over real HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use fitcraft::config::{CoachConfig, WorkoutConfig};
use fitcraft::error::LlmError;
use fitcraft::http::build_router;
use fitcraft::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use fitcraft::onboarding::{CoachRouteState, TurnProcessor};
use fitcraft::store::{Database, LibSqlBackend};
use fitcraft::workouts::{WorkoutGenerator, WorkoutRouteState};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const WORKOUT_JSON: &str = r#"```json
{
  "workoutName": "Morning Mover",
  "workoutType": "strength",
  "estimatedDuration": 30,
  "difficultyLevel": "beginner",
  "phases": {
    "mainWorkout": {"duration": 20, "exercises": [{"name": "Goblet Squat", "sets": 3, "reps": 10, "rest": 60}]}
  },
  "coachingTips": ["Brace your core"]
}
```"#;

/// Stub LLM provider (no real API calls).
struct StubLlm {
    reply: &'static str,
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: self.reply.to_string(),
            input_tokens: 0,
            output_tokens: 0,
        })
    }
}

/// Start the service and return the base URL plus the backing store.
async fn start_server() -> (String, Arc<LibSqlBackend>) {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let coach = CoachRouteState {
        processor: Arc::new(TurnProcessor::new(
            db.clone(),
            Arc::new(StubLlm {
                reply: "Great goal! How active are you on a typical week?",
            }),
            CoachConfig::default(),
        )),
    };
    let workouts = WorkoutRouteState {
        generator: Arc::new(WorkoutGenerator::new(
            db.clone(),
            Arc::new(StubLlm {
                reply: WORKOUT_JSON,
            }),
            WorkoutConfig::default(),
        )),
    };
    let app = build_router(coach, workouts, None);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://127.0.0.1:{port}"), db)
}

async fn post(url: String, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "fitcraft");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn first_turn_creates_conversation_and_advances() {
    timeout(TEST_TIMEOUT, async {
        let (base, db) = start_server().await;
        let (status, body) = post(
            format!("{base}/api/coach/chat"),
            json!({"message": "I want to lose weight", "user_id": "u1", "current_step": 1}),
        )
        .await;
        assert_eq!(status, 200);
        let data = &body["data"];
        assert_eq!(data["current_step"], 2);
        assert_eq!(data["completed"], false);
        assert_eq!(
            data["response"],
            "Great goal! How active are you on a typical week?"
        );

        let conversation_id: uuid::Uuid = data["conversation_id"].as_str().unwrap().parse().unwrap();
        let messages = db.list_messages(conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);

        let flow = db.get_flow_state("u1").await.unwrap().unwrap();
        assert_eq!(flow.current_step, 2);
        assert_eq!(flow.step_answers.get(&1).map(String::as_str), Some("I want to lose weight"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn follow_up_turn_reuses_conversation_and_history_is_readable() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let (_, first) = post(
            format!("{base}/api/coach/chat"),
            json!({"message": "Build muscle", "user_id": "u2", "current_step": 1}),
        )
        .await;
        let id = first["data"]["conversation_id"].as_str().unwrap().to_string();

        let (status, second) = post(
            format!("{base}/api/coach/chat"),
            json!({
                "message": "Three times a week",
                "user_id": "u2",
                "conversation_id": id,
                "current_step": 2,
                "step_data": {"1": "Build muscle"}
            }),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(second["data"]["conversation_id"], id.as_str());
        assert_eq!(second["data"]["current_step"], 3);

        let resp = reqwest::get(format!("{base}/api/coach/conversations/{id}/messages"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        let messages = body["data"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["content"], "Build muscle");
        assert_eq!(messages[2]["content"], "Three times a week");

        let resp = reqwest::get(format!("{base}/api/coach/state/u2")).await.unwrap();
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["current_step"], 3);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_turn_returns_error_envelope() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        for payload in [
            json!({"message": "", "user_id": "u1", "current_step": 1}),
            json!({"message": "hi", "user_id": "", "current_step": 1}),
            json!({"message": "hi", "user_id": "u1", "current_step": 13}),
            json!({"message": "hi", "user_id": "u1", "current_step": 0}),
        ] {
            let (status, body) = post(format!("{base}/api/coach/chat"), payload).await;
            assert_eq!(status, 400);
            assert_eq!(body["error"]["code"], "FITCRAFT_AI_CHAT_FAILED");
            assert!(body["error"]["message"].as_str().is_some());
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let (status, body) = post(
            format!("{base}/api/coach/chat"),
            json!({
                "message": "hello",
                "user_id": "u1",
                "conversation_id": uuid::Uuid::new_v4(),
                "current_step": 1
            }),
        )
        .await;
        assert_eq!(status, 404);
        assert_eq!(body["error"]["code"], "FITCRAFT_AI_CHAT_FAILED");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn workout_generation_returns_saved_plan() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let (status, body) = post(
            format!("{base}/api/workouts/generate"),
            json!({"userId": "u1", "workoutType": "strength", "duration": 30}),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["workout"]["workoutName"], "Morning Mover");
        assert_eq!(body["data"]["saved"]["status"], "saved");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn billing_routes_absent_without_payments() {
    timeout(TEST_TIMEOUT, async {
        let (base, _) = start_server().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/api/subscriptions/sync"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}
