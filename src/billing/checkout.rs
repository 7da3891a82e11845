//! Subscription checkout: plan lookup, customer resolution, hosted checkout session.

use std::sync::Arc;

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::stripe::{CheckoutSessionParams, PaymentProvider};
use crate::error::{ApiError, DatabaseError, PaymentError};
use crate::store::Database;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub plan_type: String,
    #[serde(default)]
    pub customer_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutOutcome {
    pub checkout_url: Option<String>,
    pub session_id: String,
    pub customer_id: String,
    pub plan_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Plan {0} not found")]
    PlanNotFound(String),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Payment(#[from] PaymentError),
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        let status = match &err {
            CheckoutError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CheckoutError::PlanNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, "SUBSCRIPTION_CREATION_FAILED", err.to_string())
    }
}

pub struct CheckoutService {
    db: Arc<dyn Database>,
    payments: Arc<dyn PaymentProvider>,
}

impl CheckoutService {
    pub fn new(db: Arc<dyn Database>, payments: Arc<dyn PaymentProvider>) -> Self {
        Self { db, payments }
    }

    /// Start a subscription checkout. `origin` is the caller's site, used for return URLs.
    pub async fn create(
        &self,
        request: CheckoutRequest,
        origin: &str,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let plan_type = request.plan_type.trim();
        let email = request.customer_email.trim();
        if plan_type.is_empty() || email.is_empty() {
            return Err(CheckoutError::InvalidInput(
                "Plan type and customer email are required".to_string(),
            ));
        }

        let plan = self
            .db
            .get_plan(plan_type)
            .await?
            .ok_or_else(|| CheckoutError::PlanNotFound(plan_type.to_string()))?;

        let customer_id = match self.payments.find_customer_by_email(email).await? {
            Some(id) => {
                info!(customer_id = %id, "Found existing customer");
                id
            }
            None => {
                let id = self.payments.create_customer(email).await?;
                info!(customer_id = %id, "Created new customer");
                id
            }
        };

        let origin = origin.trim_end_matches('/');
        let session = self
            .payments
            .create_checkout_session(&CheckoutSessionParams {
                customer_id: customer_id.clone(),
                price_id: plan.price_id.clone(),
                plan_type: plan.plan_type.clone(),
                customer_email: email.to_string(),
                success_url: format!("{origin}/subscription?subscription=success"),
                cancel_url: format!("{origin}/subscription?subscription=cancelled"),
            })
            .await?;

        info!(session_id = %session.id, plan_type = %plan.plan_type, "Checkout session created");
        Ok(CheckoutOutcome {
            checkout_url: session.url,
            session_id: session.id,
            customer_id,
            plan_type: plan.plan_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::billing::model::Plan;
    use crate::billing::stripe::{CheckoutSession, ProviderSubscription};
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct RecordingPayments {
        existing_customer: Option<String>,
        created: Mutex<Vec<String>>,
        sessions: Mutex<Vec<CheckoutSessionParams>>,
    }

    #[async_trait]
    impl PaymentProvider for RecordingPayments {
        async fn find_customer_by_email(&self, _: &str) -> Result<Option<String>, PaymentError> {
            Ok(self.existing_customer.clone())
        }
        async fn create_customer(&self, email: &str) -> Result<String, PaymentError> {
            self.created.lock().unwrap().push(email.to_string());
            Ok("cus_new".to_string())
        }
        async fn create_checkout_session(
            &self,
            params: &CheckoutSessionParams,
        ) -> Result<CheckoutSession, PaymentError> {
            self.sessions.lock().unwrap().push(params.clone());
            Ok(CheckoutSession {
                id: "cs_1".to_string(),
                url: Some("https://checkout.example/cs_1".to_string()),
            })
        }
        async fn get_subscription(&self, _: &str) -> Result<ProviderSubscription, PaymentError> {
            unimplemented!()
        }
        async fn cancel_subscription(&self, _: &str) -> Result<(), PaymentError> {
            unimplemented!()
        }
    }

    async fn seeded_db() -> Arc<LibSqlBackend> {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.upsert_plan(&Plan {
            plan_type: "premium".to_string(),
            price_id: "price_123".to_string(),
            name: "Premium".to_string(),
            monthly_price_cents: 1999,
        })
        .await
        .unwrap();
        db
    }

    fn request(plan: &str, email: &str) -> CheckoutRequest {
        CheckoutRequest {
            plan_type: plan.to_string(),
            customer_email: email.to_string(),
        }
    }

    #[tokio::test]
    async fn creates_customer_when_absent() {
        let payments = Arc::new(RecordingPayments::default());
        let service = CheckoutService::new(seeded_db().await, payments.clone());

        let outcome = service
            .create(request("premium", "ana@example.com"), "https://app.example/")
            .await
            .unwrap();
        assert_eq!(outcome.customer_id, "cus_new");
        assert_eq!(outcome.session_id, "cs_1");
        assert_eq!(outcome.plan_type, "premium");
        assert_eq!(payments.created.lock().unwrap().as_slice(), ["ana@example.com"]);

        let sessions = payments.sessions.lock().unwrap();
        assert_eq!(sessions[0].price_id, "price_123");
        assert_eq!(
            sessions[0].success_url,
            "https://app.example/subscription?subscription=success"
        );
        assert_eq!(
            sessions[0].cancel_url,
            "https://app.example/subscription?subscription=cancelled"
        );
    }

    #[tokio::test]
    async fn reuses_existing_customer() {
        let payments = Arc::new(RecordingPayments {
            existing_customer: Some("cus_old".to_string()),
            ..Default::default()
        });
        let service = CheckoutService::new(seeded_db().await, payments.clone());
        let outcome = service
            .create(request("premium", "ana@example.com"), "https://app.example")
            .await
            .unwrap();
        assert_eq!(outcome.customer_id, "cus_old");
        assert!(payments.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_plan_is_not_found() {
        let payments = Arc::new(RecordingPayments::default());
        let service = CheckoutService::new(seeded_db().await, payments.clone());
        let err = service
            .create(request("platinum", "ana@example.com"), "https://app.example")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::PlanNotFound(_)));
        let api: ApiError = err.into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.code, "SUBSCRIPTION_CREATION_FAILED");
        assert!(payments.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_rejected() {
        let service = CheckoutService::new(
            seeded_db().await,
            Arc::new(RecordingPayments::default()),
        );
        for req in [request("", "a@b.c"), request("premium", "  ")] {
            let err = service.create(req, "https://app.example").await.unwrap_err();
            assert!(matches!(err, CheckoutError::InvalidInput(_)));
        }
    }
}
