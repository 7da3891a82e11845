//! Error types for FitCraft.
//!
//! Each concern (config, storage, LLM, payments, webhooks) has its own enum.
//! Operation-level errors (`TurnError`, `WorkoutError`, ...) wrap those and
//! decide the HTTP status and wire code via [`ApiError`].

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend returned {status}: {body}")]
    Http { status: u16, body: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned an error: {message}")]
    Upstream { provider: String, message: String },

    #[error("Provider {provider} timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("Empty completion from {provider}")]
    EmptyCompletion { provider: String },
}

/// Payment provider errors.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider request failed: {0}")]
    Request(String),

    #[error("Payment provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Subscription {0} not found upstream")]
    SubscriptionNotFound(String),

    #[error("Invalid payment provider response: {0}")]
    InvalidResponse(String),
}

/// Webhook verification and dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing Stripe signature")]
    MissingSignature,

    #[error("Invalid signature format")]
    MalformedSignature,

    #[error("Invalid signature")]
    SignatureMismatch,

    #[error("Webhook secret is not a usable HMAC key")]
    InvalidSecret,

    #[error("Signature timestamp outside tolerance ({age_secs}s old)")]
    StaleTimestamp { age_secs: i64 },

    #[error("Invalid event payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),
}

/// Wire envelope for every failed request: `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "error": {
                    "code": self.code,
                    "message": self.message,
                }
            })),
        )
            .into_response()
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, "WEBHOOK_FAILED", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn api_error_renders_envelope() {
        let err = ApiError::new(StatusCode::BAD_REQUEST, "SOME_CODE", "bad input");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "SOME_CODE");
        assert_eq!(json["error"]["message"], "bad input");
    }

    #[test]
    fn webhook_errors_map_to_bad_request() {
        let api: ApiError = WebhookError::SignatureMismatch.into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, "WEBHOOK_FAILED");
        assert_eq!(api.message, "Invalid signature");
    }
}
