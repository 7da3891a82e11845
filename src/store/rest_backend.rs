//! BaaS REST backend (PostgREST dialect).
//!
//! Every entity lives in a hosted table reached over `/rest/v1/<table>`.
//! Column names on the hosted schema differ from the domain models, so each
//! table gets a small wire row type that converts both ways.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::billing::model::{Plan, Subscription, SubscriptionStatus};
use crate::error::DatabaseError;
use crate::onboarding::model::{Author, ConversationSession, Message, SessionStatus};
use crate::onboarding::state::FlowState;
use crate::store::traits::{Database, SessionUpdate};
use crate::workouts::model::WorkoutRecord;

const CONVERSATIONS: &str = "ai_chat_conversations";
const MESSAGES: &str = "ai_chat_messages";
const FLOW_STATES: &str = "ai_chat_flow_state";
const WORKOUTS: &str = "workouts";
const PLANS: &str = "fitcraft_plans";
const SUBSCRIPTIONS: &str = "fitcraft_subscriptions";

/// Database backed by the hosted BaaS REST API.
pub struct RestBackend {
    client: Client,
    base_url: String,
    service_key: SecretString,
}

type Filter = Vec<(&'static str, String)>;

impl RestBackend {
    pub fn new(client: Client, base_url: impl Into<String>, service_key: SecretString) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let key = self.service_key.expose_secret();
        builder.bearer_auth(key).header("apikey", key)
    }

    async fn send(&self, builder: RequestBuilder, op: &str) -> Result<Response, DatabaseError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatabaseError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        mut filter: Filter,
        op: &str,
    ) -> Result<Vec<T>, DatabaseError> {
        filter.push(("select", "*".to_string()));
        let response = self
            .send(self.client.get(self.table_url(table)).query(&filter), op)
            .await?;
        response
            .json()
            .await
            .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))
    }

    async fn insert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        row: &T,
        op: &str,
    ) -> Result<(), DatabaseError> {
        self.send(
            self.client
                .post(self.table_url(table))
                .header("Prefer", "return=representation")
                .json(row),
            op,
        )
        .await?;
        Ok(())
    }

    /// PATCH matching rows and return how many were touched.
    async fn patch(
        &self,
        table: &str,
        filter: Filter,
        body: serde_json::Value,
        op: &str,
    ) -> Result<usize, DatabaseError> {
        let response = self
            .send(
                self.client
                    .patch(self.table_url(table))
                    .query(&filter)
                    .header("Prefer", "return=representation")
                    .json(&body),
                op,
            )
            .await?;
        count_rows(response, op).await
    }

    /// DELETE matching rows and return how many were removed.
    async fn delete(&self, table: &str, filter: Filter, op: &str) -> Result<usize, DatabaseError> {
        let response = self
            .send(
                self.client
                    .delete(self.table_url(table))
                    .query(&filter)
                    .header("Prefer", "return=representation"),
                op,
            )
            .await?;
        count_rows(response, op).await
    }
}

async fn count_rows(response: Response, op: &str) -> Result<usize, DatabaseError> {
    let rows: Vec<serde_json::Value> = response
        .json()
        .await
        .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))?;
    Ok(rows.len())
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Wire rows ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ConversationRow {
    id: Uuid,
    user_id: String,
    conversation_title: String,
    status: String,
    #[serde(default)]
    total_messages: Option<i64>,
    #[serde(default)]
    last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    context_type: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<&ConversationSession> for ConversationRow {
    fn from(session: &ConversationSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id.clone(),
            conversation_title: session.title.clone(),
            status: session.status.as_str().to_string(),
            total_messages: Some(i64::from(session.message_count)),
            last_message_at: session.last_message_at,
            context_type: Some("fitcraft_coaching".to_string()),
            created_at: Some(session.created_at),
        }
    }
}

impl From<ConversationRow> for ConversationSession {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.conversation_title,
            status: row.status.parse().unwrap_or(SessionStatus::Active),
            message_count: row.total_messages.unwrap_or(0).max(0) as u32,
            last_message_at: row.last_message_at,
            created_at: row.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MessageContext {
    #[serde(default)]
    step: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    message_type: String,
    content: String,
    is_from_ai: bool,
    #[serde(default)]
    message_context: MessageContext,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<&Message> for MessageRow {
    fn from(message: &Message) -> Self {
        let is_from_ai = message.author == Author::Assistant;
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            message_type: if is_from_ai { "ai_response" } else { "user_input" }.to_string(),
            content: message.content.clone(),
            is_from_ai,
            message_context: MessageContext {
                step: message.step_at_time,
            },
            created_at: Some(message.created_at),
        }
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            author: if row.is_from_ai {
                Author::Assistant
            } else {
                Author::User
            },
            content: row.content,
            step_at_time: row.message_context.step,
            created_at: row.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FlowStateRow {
    user_id: String,
    chat_step: u8,
    #[serde(default)]
    step_data: BTreeMap<u8, String>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<&FlowState> for FlowStateRow {
    fn from(state: &FlowState) -> Self {
        Self {
            user_id: state.user_id.clone(),
            chat_step: state.current_step,
            step_data: state.step_answers.clone(),
            completed: state.completed,
            updated_at: Some(state.updated_at),
        }
    }
}

impl From<FlowStateRow> for FlowState {
    fn from(row: FlowStateRow) -> Self {
        Self {
            user_id: row.user_id,
            current_step: row.chat_step,
            step_answers: row.step_data,
            completed: row.completed,
            updated_at: row.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlanRow {
    plan_type: String,
    price_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "price_cents")]
    monthly_price_cents: Option<i64>,
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Self {
            name: row.name.unwrap_or_else(|| row.plan_type.clone()),
            plan_type: row.plan_type,
            price_id: row.price_id,
            monthly_price_cents: row.monthly_price_cents.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    stripe_subscription_id: String,
    stripe_customer_id: String,
    price_id: String,
    status: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<&Subscription> for SubscriptionRow {
    fn from(sub: &Subscription) -> Self {
        Self {
            id: sub.id,
            user_id: sub.user_id.clone(),
            stripe_subscription_id: sub.provider_subscription_id.clone(),
            stripe_customer_id: sub.provider_customer_id.clone(),
            price_id: sub.price_id.clone(),
            status: sub.status.as_str().to_string(),
            created_at: Some(sub.created_at),
            updated_at: Some(sub.updated_at),
        }
    }
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        let now = Utc::now();
        Self {
            id: row.id,
            user_id: row.user_id,
            provider_subscription_id: row.stripe_subscription_id,
            provider_customer_id: row.stripe_customer_id,
            price_id: row.price_id,
            status: SubscriptionStatus::parse(&row.status)
                .unwrap_or(SubscriptionStatus::Incomplete),
            created_at: row.created_at.unwrap_or(now),
            updated_at: row.updated_at.unwrap_or(now),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AdminUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdminUsers {
    #[serde(default)]
    users: Vec<AdminUser>,
}

// ── Database impl ───────────────────────────────────────────────────

#[async_trait]
impl Database for RestBackend {
    async fn create_conversation(&self, session: &ConversationSession) -> Result<(), DatabaseError> {
        self.insert(
            CONVERSATIONS,
            &ConversationRow::from(session),
            "create_conversation",
        )
        .await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationSession>, DatabaseError> {
        let rows: Vec<ConversationRow> = self
            .select(CONVERSATIONS, vec![("id", eq(id))], "get_conversation")
            .await?;
        Ok(rows.into_iter().next().map(ConversationSession::from))
    }

    async fn update_conversation(&self, id: Uuid, update: &SessionUpdate) -> Result<(), DatabaseError> {
        let touched = self
            .patch(
                CONVERSATIONS,
                vec![("id", eq(id))],
                json!({
                    "total_messages": update.message_count,
                    "last_message_at": timestamp(&update.last_message_at),
                    "status": update.status.as_str(),
                }),
                "update_conversation",
            )
            .await?;
        if touched == 0 {
            return Err(DatabaseError::NotFound {
                entity: "conversation".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), DatabaseError> {
        self.insert(MESSAGES, &MessageRow::from(message), "append_message")
            .await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, DatabaseError> {
        let rows: Vec<MessageRow> = self
            .select(
                MESSAGES,
                vec![
                    ("conversation_id", eq(conversation_id)),
                    ("order", "created_at.asc".to_string()),
                ],
                "list_messages",
            )
            .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn prune_messages(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        self.delete(
            MESSAGES,
            vec![("created_at", format!("lt.{}", timestamp(&cutoff)))],
            "prune_messages",
        )
        .await
    }

    async fn get_flow_state(&self, user_id: &str) -> Result<Option<FlowState>, DatabaseError> {
        let rows: Vec<FlowStateRow> = self
            .select(FLOW_STATES, vec![("user_id", eq(user_id))], "get_flow_state")
            .await?;
        Ok(rows.into_iter().next().map(FlowState::from))
    }

    async fn save_flow_state(&self, state: &FlowState) -> Result<(), DatabaseError> {
        self.send(
            self.client
                .post(self.table_url(FLOW_STATES))
                .query(&[("on_conflict", "user_id")])
                .header("Prefer", "resolution=merge-duplicates")
                .json(&FlowStateRow::from(state)),
            "save_flow_state",
        )
        .await?;
        Ok(())
    }

    async fn prune_flow_states(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        self.delete(
            FLOW_STATES,
            vec![("updated_at", format!("lt.{}", timestamp(&cutoff)))],
            "prune_flow_states",
        )
        .await
    }

    async fn insert_workout(&self, workout: &WorkoutRecord) -> Result<(), DatabaseError> {
        self.insert(WORKOUTS, workout, "insert_workout").await
    }

    async fn get_plan(&self, plan_type: &str) -> Result<Option<Plan>, DatabaseError> {
        let rows: Vec<PlanRow> = self
            .select(PLANS, vec![("plan_type", eq(plan_type))], "get_plan")
            .await?;
        Ok(rows.into_iter().next().map(Plan::from))
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), DatabaseError> {
        self.insert(
            SUBSCRIPTIONS,
            &SubscriptionRow::from(subscription),
            "insert_subscription",
        )
        .await
    }

    async fn list_subscriptions_page(
        &self,
        statuses: &[SubscriptionStatus],
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Subscription>, DatabaseError> {
        if statuses.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let status_list = statuses
            .iter()
            .map(SubscriptionStatus::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let mut filter: Filter = vec![
            ("status", format!("in.({status_list})")),
            ("order", "id.asc".to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(after) = after {
            filter.push(("id", format!("gt.{after}")));
        }

        let rows: Vec<SubscriptionRow> = self
            .select(SUBSCRIPTIONS, filter, "list_subscriptions_page")
            .await?;
        debug!(count = rows.len(), "Fetched subscription page");
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn set_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), DatabaseError> {
        let touched = self
            .patch(
                SUBSCRIPTIONS,
                vec![("id", eq(id))],
                json!({ "status": status.as_str(), "updated_at": timestamp(&Utc::now()) }),
                "set_subscription_status",
            )
            .await?;
        if touched == 0 {
            return Err(DatabaseError::NotFound {
                entity: "subscription".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn set_subscription_status_by_provider_id(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<usize, DatabaseError> {
        self.patch(
            SUBSCRIPTIONS,
            vec![("stripe_subscription_id", eq(provider_subscription_id))],
            json!({ "status": status.as_str(), "updated_at": timestamp(&Utc::now()) }),
            "set_subscription_status_by_provider_id",
        )
        .await
    }

    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, DatabaseError> {
        let response = self
            .send(
                self.client
                    .get(format!("{}/auth/v1/admin/users", self.base_url)),
                "find_user_id_by_email",
            )
            .await?;
        let listing: AdminUsers = response
            .json()
            .await
            .map_err(|e| DatabaseError::Serialization(format!("find_user_id_by_email: {e}")))?;

        Ok(listing
            .users
            .into_iter()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|u| u.id))
    }
}
