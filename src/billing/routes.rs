//! REST endpoints for subscriptions and payment webhooks.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use super::checkout::{CheckoutRequest, CheckoutService};
use super::sync::SubscriptionSync;
use super::webhook::{SIGNATURE_HEADER, WebhookHandler};
use crate::error::ApiError;
use crate::http::data;

/// Return URLs fall back to this when the request carries no Origin.
const DEFAULT_ORIGIN: &str = "http://localhost:3000";

#[derive(Clone)]
pub struct BillingRouteState {
    pub checkout: Arc<CheckoutService>,
    pub sync: Arc<SubscriptionSync>,
    /// `None` when no signing secret is configured; the endpoint then rejects everything.
    pub webhook: Option<Arc<WebhookHandler>>,
}

/// POST /api/subscriptions/checkout
async fn checkout(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|e| {
        ApiError::new(StatusCode::BAD_REQUEST, "SUBSCRIPTION_CREATION_FAILED", e.body_text())
    })?;
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_ORIGIN);

    let outcome = state.checkout.create(request, origin).await.map_err(|e| {
        tracing::error!(error = %e, "Checkout failed");
        ApiError::from(e)
    })?;
    Ok(data(outcome))
}

/// POST /api/subscriptions/sync
async fn sync(State(state): State<BillingRouteState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.sync.run().await?;
    Ok(data(report))
}

/// POST /api/webhooks/stripe
///
/// Takes the raw body: the signature covers the exact bytes sent.
async fn stripe_webhook(
    State(state): State<BillingRouteState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let Some(handler) = state.webhook else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "WEBHOOK_FAILED",
            "Webhook secret not configured",
        ));
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let action = handler.handle(signature, &body).await.map_err(|e| {
        tracing::warn!(error = %e, "Webhook rejected");
        ApiError::from(e)
    })?;
    tracing::debug!(?action, "Webhook applied");
    Ok(Json(serde_json::json!({ "received": true })))
}

pub fn billing_routes(state: BillingRouteState) -> Router {
    Router::new()
        .route("/api/subscriptions/checkout", post(checkout))
        .route("/api/subscriptions/sync", post(sync))
        .route("/api/webhooks/stripe", post(stripe_webhook))
        .with_state(state)
}
