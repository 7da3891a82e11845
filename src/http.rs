//! HTTP surface: the success envelope, health check and router assembly.

use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::billing::{BillingRouteState, billing_routes};
use crate::onboarding::{CoachRouteState, coach_routes};
use crate::workouts::{WorkoutRouteState, workout_routes};

/// Wrap a successful payload as `{"data": ...}`.
pub fn data<T: Serialize>(value: T) -> Json<serde_json::Value> {
    let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
    Json(serde_json::json!({ "data": value }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "fitcraft",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Browser clients call from arbitrary origins.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Assemble every route. Billing is mounted only when payments are configured.
pub fn build_router(
    coach: CoachRouteState,
    workouts: WorkoutRouteState,
    billing: Option<BillingRouteState>,
) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .merge(coach_routes(coach))
        .merge(workout_routes(workouts));
    if let Some(billing) = billing {
        router = router.merge(billing_routes(billing));
    }
    router.layer(cors_layer())
}
