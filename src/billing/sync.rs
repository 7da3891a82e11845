//! Subscription lifecycle sync.
//!
//! Walks local subscriptions that should still be live, reconciles each with
//! the payment provider, then prunes old coach data. Runs on a cron schedule
//! and on demand over HTTP.

use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::model::{Subscription, SubscriptionStatus};
use super::stripe::PaymentProvider;
use crate::config::SyncConfig;
use crate::error::{ApiError, ConfigError, DatabaseError, PaymentError};
use crate::store::Database;

/// What happened to one subscription during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    MarkedCancelled { reason: String },
    StatusUpdated {
        old_status: SubscriptionStatus,
        new_status: SubscriptionStatus,
    },
    NoChange { status: SubscriptionStatus },
    AutoCancelled { reason: String },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub subscription_id: Uuid,
    #[serde(flatten)]
    pub action: SyncAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub processed: usize,
    pub synced: usize,
    pub errors: usize,
    pub results: Vec<SyncResult>,
    pub started_at: DateTime<Utc>,
    pub pruned_flow_states: usize,
    pub pruned_messages: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Failed to fetch subscriptions: {0}")]
    Database(#[from] DatabaseError),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "SUBSCRIPTION_SYNC_FAILED",
            err.to_string(),
        )
    }
}

#[derive(Debug, thiserror::Error)]
enum ReconcileError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("Unrecognized upstream status: {0}")]
    UnknownStatus(String),
}

pub struct SubscriptionSync {
    db: Arc<dyn Database>,
    payments: Arc<dyn PaymentProvider>,
    config: SyncConfig,
}

impl SubscriptionSync {
    pub fn new(db: Arc<dyn Database>, payments: Arc<dyn PaymentProvider>, config: SyncConfig) -> Self {
        Self {
            db,
            payments,
            config,
        }
    }

    /// Run one full pass. Per-subscription failures are recorded in the
    /// report; only a failure to list subscriptions aborts the run.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let mut report = SyncReport {
            processed: 0,
            synced: 0,
            errors: 0,
            results: Vec::new(),
            started_at,
            pruned_flow_states: 0,
            pruned_messages: 0,
        };

        let mut after = None;
        loop {
            let page = self
                .db
                .list_subscriptions_page(&SubscriptionStatus::SYNCABLE, after, self.config.page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.id);
            let full_page = page.len() >= self.config.page_size;

            for subscription in &page {
                report.processed += 1;
                let action = match self.reconcile(subscription).await {
                    Ok(action) => action,
                    Err(e) => {
                        error!(subscription_id = %subscription.id, error = %e, "Subscription sync failed");
                        SyncAction::Error {
                            error: e.to_string(),
                        }
                    }
                };
                match &action {
                    SyncAction::Error { .. } => report.errors += 1,
                    SyncAction::NoChange { .. } => {}
                    _ => report.synced += 1,
                }
                report.results.push(SyncResult {
                    subscription_id: subscription.id,
                    action,
                });
            }

            if !full_page {
                break;
            }
        }

        self.prune(&mut report).await;

        info!(
            processed = report.processed,
            synced = report.synced,
            errors = report.errors,
            pruned_flow_states = report.pruned_flow_states,
            pruned_messages = report.pruned_messages,
            "Subscription sync completed"
        );
        Ok(report)
    }

    async fn reconcile(&self, subscription: &Subscription) -> Result<SyncAction, ReconcileError> {
        let upstream = match self
            .payments
            .get_subscription(&subscription.provider_subscription_id)
            .await
        {
            Ok(upstream) => upstream,
            Err(PaymentError::SubscriptionNotFound(_)) => {
                self.db
                    .set_subscription_status(subscription.id, SubscriptionStatus::Cancelled)
                    .await?;
                info!(subscription_id = %subscription.id, "Marked cancelled: not found upstream");
                return Ok(SyncAction::MarkedCancelled {
                    reason: "not_found_in_stripe".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let status = upstream
            .local_status()
            .ok_or_else(|| ReconcileError::UnknownStatus(upstream.status.clone()))?;

        if status == SubscriptionStatus::PastDue {
            if let Some(days) = self.days_past_due(upstream.period_end()) {
                if days > self.config.past_due_cancel_days {
                    self.payments
                        .cancel_subscription(&subscription.provider_subscription_id)
                        .await?;
                    self.db
                        .set_subscription_status(subscription.id, SubscriptionStatus::Cancelled)
                        .await?;
                    warn!(subscription_id = %subscription.id, days, "Auto-cancelled past-due subscription");
                    return Ok(SyncAction::AutoCancelled {
                        reason: format!("past_due_{days}_days"),
                    });
                }
            }
        }

        if status != subscription.status {
            self.db
                .set_subscription_status(subscription.id, status)
                .await?;
            info!(
                subscription_id = %subscription.id,
                old_status = %subscription.status,
                new_status = %status,
                "Subscription status updated"
            );
            return Ok(SyncAction::StatusUpdated {
                old_status: subscription.status,
                new_status: status,
            });
        }

        Ok(SyncAction::NoChange { status })
    }

    /// Whole days since `period_end` (unix seconds).
    fn days_past_due(&self, period_end: Option<i64>) -> Option<i64> {
        let end = DateTime::<Utc>::from_timestamp(period_end?, 0)?;
        Some((Utc::now() - end).num_days())
    }

    async fn prune(&self, report: &mut SyncReport) {
        let now = Utc::now();
        match self
            .db
            .prune_flow_states(now - Duration::days(self.config.flow_state_retention_days))
            .await
        {
            Ok(n) => report.pruned_flow_states = n,
            Err(e) => warn!(error = %e, "Failed to prune flow states"),
        }
        match self
            .db
            .prune_messages(now - Duration::days(self.config.message_retention_days))
            .await
        {
            Ok(n) => report.pruned_messages = n,
            Err(e) => warn!(error = %e, "Failed to prune messages"),
        }
    }
}

/// Parse a six-field cron expression.
pub fn parse_schedule(expr: &str) -> Result<Schedule, ConfigError> {
    Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
        key: "FITCRAFT_SYNC_SCHEDULE".to_string(),
        message: e.to_string(),
    })
}

/// Spawn the background task that runs the sync on `schedule`.
pub fn spawn_sync_ticker(
    sync: Arc<SubscriptionSync>,
    schedule: Schedule,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("Sync schedule has no upcoming fire time; ticker stopped");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = sync.run().await {
                error!(error = %e, "Scheduled subscription sync failed");
            }
        }
    })
}
