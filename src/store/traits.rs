//! The `Database` trait: one async interface for all persistence.
//!
//! Implemented by the BaaS REST client (`RestBackend`) and the local libSQL
//! store (`LibSqlBackend`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::billing::model::{Plan, Subscription, SubscriptionStatus};
use crate::error::DatabaseError;
use crate::onboarding::model::{ConversationSession, Message, SessionStatus};
use crate::onboarding::state::FlowState;
use crate::workouts::model::WorkoutRecord;

/// Counter and timestamp changes applied to a session after a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub message_count: u32,
    pub last_message_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Backend-agnostic database trait covering every persisted entity.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Conversations ───────────────────────────────────────────────

    /// Insert a new conversation session.
    async fn create_conversation(&self, session: &ConversationSession) -> Result<(), DatabaseError>;

    /// Get a conversation by id.
    async fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationSession>, DatabaseError>;

    /// Overwrite the counters and status of a conversation.
    async fn update_conversation(&self, id: Uuid, update: &SessionUpdate) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Append a message. Messages are never updated afterwards.
    async fn append_message(&self, message: &Message) -> Result<(), DatabaseError>;

    /// List a conversation's messages in the order they were written.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, DatabaseError>;

    /// Delete messages created before `cutoff`. Returns the number deleted.
    async fn prune_messages(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Flow state ──────────────────────────────────────────────────

    /// Get a user's coach flow state.
    async fn get_flow_state(&self, user_id: &str) -> Result<Option<FlowState>, DatabaseError>;

    /// Insert or replace a user's coach flow state.
    async fn save_flow_state(&self, state: &FlowState) -> Result<(), DatabaseError>;

    /// Delete flow states last updated before `cutoff`. Returns the number deleted.
    async fn prune_flow_states(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    // ── Workouts ────────────────────────────────────────────────────

    /// Insert a workout row.
    async fn insert_workout(&self, workout: &WorkoutRecord) -> Result<(), DatabaseError>;

    // ── Billing ─────────────────────────────────────────────────────

    /// Look up a plan by its type (e.g. `"premium"`).
    async fn get_plan(&self, plan_type: &str) -> Result<Option<Plan>, DatabaseError>;

    /// Insert a subscription row.
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), DatabaseError>;

    /// Page through subscriptions whose status is in `statuses`, ordered by id.
    ///
    /// Keyset pagination: pass the last id of the previous page as `after`.
    async fn list_subscriptions_page(
        &self,
        statuses: &[SubscriptionStatus],
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Subscription>, DatabaseError>;

    /// Set the status of a subscription by local id.
    async fn set_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), DatabaseError>;

    /// Set the status of every row with the given provider subscription id.
    /// Returns the number of rows touched.
    async fn set_subscription_status_by_provider_id(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Resolve a user id from an email address.
    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, DatabaseError>;
}
