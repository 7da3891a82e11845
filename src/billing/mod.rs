//! Subscriptions: checkout, payment webhooks and the reconciliation job.

pub mod checkout;
pub mod model;
pub mod routes;
pub mod stripe;
pub mod sync;
pub mod webhook;

pub use checkout::{CheckoutError, CheckoutOutcome, CheckoutRequest, CheckoutService};
pub use model::{Plan, Subscription, SubscriptionStatus};
pub use routes::{BillingRouteState, billing_routes};
pub use stripe::{PaymentProvider, StripeClient};
pub use sync::{SubscriptionSync, SyncReport, parse_schedule, spawn_sync_ticker};
pub use webhook::{WebhookHandler, WebhookVerifier};
