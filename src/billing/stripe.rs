//! Payment provider client.
//!
//! `PaymentProvider` is the seam the checkout, webhook and sync code talk
//! to. `StripeClient` implements it over Stripe's form-encoded REST API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::model::SubscriptionStatus;
use crate::error::PaymentError;

/// Tag written on every customer and subscription this service creates.
pub const SOURCE_TAG: &str = "fitcraft_app";

/// Subscription as reported by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    #[serde(default)]
    pub customer: String,
    /// Raw provider status, e.g. `"canceled"`.
    pub status: String,
    /// Unix seconds.
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Price {
    pub id: String,
}

impl ProviderSubscription {
    /// Status in local vocabulary, `None` for statuses we don't model.
    pub fn local_status(&self) -> Option<SubscriptionStatus> {
        SubscriptionStatus::parse(&self.status)
    }

    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }

    /// Period end, falling back to the first item's (newer API versions move it there).
    pub fn period_end(&self) -> Option<i64> {
        self.current_period_end
            .or_else(|| self.items.data.first().and_then(|i| i.current_period_end))
    }
}

/// Parameters for a subscription-mode checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSessionParams {
    pub customer_id: String,
    pub price_id: String,
    pub plan_type: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// First customer with this email, if any.
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>, PaymentError>;

    /// Create a customer and return its id.
    async fn create_customer(&self, email: &str) -> Result<String, PaymentError>;

    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, PaymentError>;

    /// Fetch a subscription. A missing one is `PaymentError::SubscriptionNotFound`.
    async fn get_subscription(&self, id: &str) -> Result<ProviderSubscription, PaymentError>;

    async fn cancel_subscription(&self, id: &str) -> Result<(), PaymentError>;
}

/// Stripe REST client.
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct CustomerList {
    #[serde(default)]
    data: Vec<Customer>,
}

#[derive(Debug, Deserialize)]
struct Customer {
    id: String,
}

impl StripeClient {
    pub fn new(client: Client, api_base: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_base)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, PaymentError> {
        builder
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| PaymentError::Request(e.to_string()))
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, PaymentError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| PaymentError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn find_customer_by_email(&self, email: &str) -> Result<Option<String>, PaymentError> {
        let response = self
            .send(
                self.client
                    .get(self.url("customers"))
                    .query(&[("email", email), ("limit", "1")]),
            )
            .await?;
        let list: CustomerList = Self::read(response).await?;
        Ok(list.data.into_iter().next().map(|c| c.id))
    }

    async fn create_customer(&self, email: &str) -> Result<String, PaymentError> {
        let response = self
            .send(
                self.client
                    .post(self.url("customers"))
                    .form(&[("email", email), ("metadata[source]", SOURCE_TAG)]),
            )
            .await?;
        let customer: Customer = Self::read(response).await?;
        debug!(customer_id = %customer.id, "Created customer");
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = [
            ("mode", "subscription"),
            ("customer", params.customer_id.as_str()),
            ("line_items[0][price]", params.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url.as_str()),
            ("cancel_url", params.cancel_url.as_str()),
            ("metadata[plan_type]", params.plan_type.as_str()),
            ("metadata[customer_email]", params.customer_email.as_str()),
            ("subscription_data[metadata][plan_type]", params.plan_type.as_str()),
            ("subscription_data[metadata][source]", SOURCE_TAG),
        ];
        let response = self
            .send(self.client.post(self.url("checkout/sessions")).form(&form))
            .await?;
        Self::read(response).await
    }

    async fn get_subscription(&self, id: &str) -> Result<ProviderSubscription, PaymentError> {
        let response = self
            .send(self.client.get(self.url(&format!("subscriptions/{id}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(PaymentError::SubscriptionNotFound(id.to_string()));
        }
        Self::read(response).await
    }

    async fn cancel_subscription(&self, id: &str) -> Result<(), PaymentError> {
        let response = self
            .send(self.client.delete(self.url(&format!("subscriptions/{id}"))))
            .await?;
        let _: serde_json::Value = Self::read(response).await?;
        Ok(())
    }
}
