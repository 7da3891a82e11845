//! Signed payment-provider webhooks.
//!
//! The `Stripe-Signature` header carries `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The expected signature is the hex HMAC-SHA256 of `"{t}.{raw body}"`
//! under the endpoint secret.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::model::{Subscription, SubscriptionStatus};
use super::stripe::PaymentProvider;
use crate::error::WebhookError;
use crate::store::Database;

type HmacSha256 = Hmac<Sha256>;

/// Header name the provider signs requests with.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Hex HMAC-SHA256 of `"{timestamp}.{body}"`.
pub fn compute_signature(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| WebhookError::MalformedSignature)?,
                    );
                }
                "v1" if !value.is_empty() => signatures.push(value.to_string()),
                _ => {}
            }
        }

        match timestamp {
            Some(timestamp) if !signatures.is_empty() => Ok(Self {
                timestamp,
                signatures,
            }),
            _ => Err(WebhookError::MalformedSignature),
        }
    }
}

/// Verifies webhook signatures against the endpoint secret.
pub struct WebhookVerifier {
    secret: SecretString,
    tolerance: Option<Duration>,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString, tolerance: Option<Duration>) -> Self {
        Self { secret, tolerance }
    }

    /// Verify `body` against the signature header at time `now` (unix seconds).
    pub fn verify(&self, header: Option<&str>, body: &[u8], now: i64) -> Result<(), WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;
        let parsed = SignatureHeader::parse(header)?;

        let expected = compute_signature(
            self.secret.expose_secret().as_bytes(),
            parsed.timestamp,
            body,
        )?;
        let matched = parsed
            .signatures
            .iter()
            .any(|sig| bool::from(sig.as_bytes().ct_eq(expected.as_bytes())));
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        if let Some(tolerance) = self.tolerance {
            let age_secs = now - parsed.timestamp;
            if age_secs > tolerance.as_secs() as i64 {
                return Err(WebhookError::StaleTimestamp { age_secs });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
}

/// What the handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    SubscriptionCreated,
    StatusUpdated { status: SubscriptionStatus, rows: usize },
    Skipped { reason: String },
    Ignored,
}

/// Verifies and applies payment-provider events.
pub struct WebhookHandler {
    db: Arc<dyn Database>,
    payments: Arc<dyn PaymentProvider>,
    verifier: WebhookVerifier,
}

impl WebhookHandler {
    pub fn new(
        db: Arc<dyn Database>,
        payments: Arc<dyn PaymentProvider>,
        verifier: WebhookVerifier,
    ) -> Self {
        Self {
            db,
            payments,
            verifier,
        }
    }

    /// Verify the raw request and apply the event it carries.
    pub async fn handle(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<EventAction, WebhookError> {
        self.verifier
            .verify(signature, body, Utc::now().timestamp())?;

        let event: Event = serde_json::from_slice(body)?;
        info!(event_id = ?event.id, event_type = %event.event_type, "Webhook received");
        self.dispatch(event).await
    }

    async fn dispatch(&self, event: Event) -> Result<EventAction, WebhookError> {
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session: CheckoutSessionObject = serde_json::from_value(event.data.object)?;
                self.checkout_completed(session).await
            }
            "customer.subscription.updated" => {
                let sub: SubscriptionObject = serde_json::from_value(event.data.object)?;
                match SubscriptionStatus::parse(&sub.status) {
                    Some(status) => self.set_status(&sub.id, status).await,
                    None => {
                        warn!(subscription_id = %sub.id, status = %sub.status, "Unknown subscription status");
                        Ok(EventAction::Skipped {
                            reason: format!("unknown status {}", sub.status),
                        })
                    }
                }
            }
            "customer.subscription.deleted" => {
                let sub: SubscriptionObject = serde_json::from_value(event.data.object)?;
                self.set_status(&sub.id, SubscriptionStatus::Cancelled).await
            }
            "invoice.payment_succeeded" => {
                self.invoice_status(event.data.object, SubscriptionStatus::Active)
                    .await
            }
            "invoice.payment_failed" => {
                self.invoice_status(event.data.object, SubscriptionStatus::PastDue)
                    .await
            }
            other => {
                debug!(event_type = other, "Ignoring webhook event");
                Ok(EventAction::Ignored)
            }
        }
    }

    async fn checkout_completed(
        &self,
        session: CheckoutSessionObject,
    ) -> Result<EventAction, WebhookError> {
        let Some(subscription_id) = session.subscription else {
            return Ok(skipped("checkout session has no subscription"));
        };
        let Some(email) = session.customer_details.and_then(|d| d.email) else {
            return Ok(skipped("checkout session has no customer email"));
        };

        let upstream = self.payments.get_subscription(&subscription_id).await?;
        let Some(user_id) = self.db.find_user_id_by_email(&email).await? else {
            warn!(subscription_id = %subscription_id, "No user for checkout email");
            return Ok(skipped("no user for customer email"));
        };

        let record = Subscription::new(
            user_id.as_str(),
            upstream.id.as_str(),
            upstream.customer.as_str(),
            upstream.price_id().unwrap_or_default(),
            upstream
                .local_status()
                .unwrap_or(SubscriptionStatus::Incomplete),
        );
        self.db.insert_subscription(&record).await?;
        info!(
            user_id = %user_id,
            subscription_id = %record.provider_subscription_id,
            status = %record.status,
            "Subscription record created"
        );
        Ok(EventAction::SubscriptionCreated)
    }

    async fn invoice_status(
        &self,
        object: serde_json::Value,
        status: SubscriptionStatus,
    ) -> Result<EventAction, WebhookError> {
        let invoice: InvoiceObject = serde_json::from_value(object)?;
        match invoice.subscription {
            Some(subscription_id) => self.set_status(&subscription_id, status).await,
            None => {
                debug!(invoice_id = ?invoice.id, "Invoice without subscription");
                Ok(skipped("invoice has no subscription"))
            }
        }
    }

    async fn set_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<EventAction, WebhookError> {
        let rows = self
            .db
            .set_subscription_status_by_provider_id(provider_subscription_id, status)
            .await?;
        info!(
            subscription_id = provider_subscription_id,
            status = %status,
            rows,
            "Subscription status updated"
        );
        Ok(EventAction::StatusUpdated { status, rows })
    }
}

fn skipped(reason: &str) -> EventAction {
    EventAction::Skipped {
        reason: reason.to_string(),
    }
}
