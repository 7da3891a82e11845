//! Subscription and plan models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription status as stored locally.
///
/// Mirrors the payment provider's vocabulary except that its `canceled`
/// spelling is stored as `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    #[serde(alias = "canceled")]
    Cancelled,
    Incomplete,
    IncompleteExpired,
    Unpaid,
    Paused,
}

impl SubscriptionStatus {
    /// Statuses the sync job reconciles against the provider.
    pub const SYNCABLE: [SubscriptionStatus; 3] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Trialing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Cancelled => "cancelled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
        }
    }

    /// Parse either the local or the provider spelling.
    pub fn parse(s: &str) -> Option<SubscriptionStatus> {
        match s {
            "active" => Some(Self::Active),
            "trialing" => Some(Self::Trialing),
            "past_due" => Some(Self::PastDue),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "incomplete" => Some(Self::Incomplete),
            "incomplete_expired" => Some(Self::IncompleteExpired),
            "unpaid" => Some(Self::Unpaid),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally stored subscription record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: String,
    pub provider_subscription_id: String,
    pub provider_customer_id: String,
    pub price_id: String,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        user_id: impl Into<String>,
        provider_subscription_id: impl Into<String>,
        provider_customer_id: impl Into<String>,
        price_id: impl Into<String>,
        status: SubscriptionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            provider_subscription_id: provider_subscription_id.into(),
            provider_customer_id: provider_customer_id.into(),
            price_id: price_id.into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A purchasable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_type: String,
    pub price_id: String,
    pub name: String,
    pub monthly_price_cents: i64,
}
