//! libSQL backend: async `Database` implementation.
//!
//! Local file or in-memory store with the same entities the BaaS holds.
//! Used for development without a hosted project and as the test store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::billing::model::{Plan, Subscription, SubscriptionStatus};
use crate::error::DatabaseError;
use crate::onboarding::model::{Author, ConversationSession, Message, SessionStatus};
use crate::onboarding::state::FlowState;
use crate::store::migrations;
use crate::store::traits::{Database, SessionUpdate};
use crate::workouts::model::WorkoutRecord;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Run schema migrations.
    pub async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Register a user/email pair (local stand-in for the BaaS auth users list).
    pub async fn upsert_user(&self, user_id: &str, email: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (id, email) VALUES (?1, ?2)
                 ON CONFLICT (id) DO UPDATE SET email = ?2",
                params![user_id, email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_user: {e}")))?;
        Ok(())
    }

    /// Insert or replace a plan.
    pub async fn upsert_plan(&self, plan: &Plan) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO plans (plan_type, price_id, name, monthly_price_cents)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (plan_type) DO UPDATE
                 SET price_id = ?2, name = ?3, monthly_price_cents = ?4",
                params![
                    plan.plan_type.as_str(),
                    plan.price_id.as_str(),
                    plan.name.as_str(),
                    plan.monthly_price_cents
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_plan: {e}")))?;
        Ok(())
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format: fixed-width RFC 3339, so text order is time order.
fn fmt_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_int(n: Option<u32>) -> libsql::Value {
    match n {
        Some(n) => libsql::Value::Integer(i64::from(n)),
        None => libsql::Value::Null,
    }
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// `'a', 'b'` list for an IN clause. Values come from a closed enum.
fn status_list(statuses: &[SubscriptionStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

const CONVERSATION_COLUMNS: &str =
    "id, user_id, title, status, message_count, last_message_at, created_at";

fn row_to_conversation(row: &libsql::Row) -> Result<ConversationSession, libsql::Error> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(3)?;
    let last_message_str: Option<String> = row.get(5).ok();
    let created_str: String = row.get(6)?;
    Ok(ConversationSession {
        id: parse_uuid(&id_str),
        user_id: row.get(1)?,
        title: row.get(2)?,
        status: status_str.parse().unwrap_or(SessionStatus::Active),
        message_count: row.get::<i64>(4)?.max(0) as u32,
        last_message_at: last_message_str.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created_str),
    })
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, author, content, step_at_time, created_at";

fn row_to_message(row: &libsql::Row) -> Result<Message, libsql::Error> {
    let id_str: String = row.get(0)?;
    let conversation_str: String = row.get(1)?;
    let author_str: String = row.get(2)?;
    let created_str: String = row.get(5)?;
    Ok(Message {
        id: parse_uuid(&id_str),
        conversation_id: parse_uuid(&conversation_str),
        author: Author::parse(&author_str),
        content: row.get(3)?,
        step_at_time: row.get::<i64>(4)?.clamp(0, i64::from(u8::MAX)) as u8,
        created_at: parse_datetime(&created_str),
    })
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, provider_subscription_id, provider_customer_id, price_id, status, created_at, updated_at";

fn row_to_subscription(row: &libsql::Row) -> Result<Subscription, libsql::Error> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(5)?;
    let created_str: String = row.get(6)?;
    let updated_str: String = row.get(7)?;
    Ok(Subscription {
        id: parse_uuid(&id_str),
        user_id: row.get(1)?,
        provider_subscription_id: row.get(2)?,
        provider_customer_id: row.get(3)?,
        price_id: row.get(4)?,
        status: SubscriptionStatus::parse(&status_str).unwrap_or(SubscriptionStatus::Incomplete),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Database impl ───────────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn create_conversation(&self, session: &ConversationSession) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO conversations (id, user_id, title, status, message_count, last_message_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.id.to_string(),
                    session.user_id.as_str(),
                    session.title.as_str(),
                    session.status.as_str(),
                    i64::from(session.message_count),
                    opt_text(session.last_message_at.as_ref().map(fmt_datetime).as_deref()),
                    fmt_datetime(&session.created_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_conversation: {e}")))?;
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_conversation(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Serialization(format!("get_conversation: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_conversation: {e}"))),
        }
    }

    async fn update_conversation(&self, id: Uuid, update: &SessionUpdate) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE conversations SET message_count = ?2, last_message_at = ?3, status = ?4
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    i64::from(update.message_count),
                    fmt_datetime(&update.last_message_at),
                    update.status.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_conversation: {e}")))?;

        if count == 0 {
            return Err(DatabaseError::NotFound {
                entity: "conversation".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn append_message(&self, message: &Message) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO messages (id, conversation_id, author, content, step_at_time, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.conversation_id.to_string(),
                    message.author.as_str(),
                    message.content.as_str(),
                    i64::from(message.step_at_time),
                    fmt_datetime(&message.created_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;
        Ok(())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC"
                ),
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?
        {
            messages.push(
                row_to_message(&row)
                    .map_err(|e| DatabaseError::Serialization(format!("list_messages: {e}")))?,
            );
        }
        Ok(messages)
    }

    async fn prune_messages(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM messages WHERE created_at < ?1",
                params![fmt_datetime(&cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_messages: {e}")))?;
        Ok(count as usize)
    }

    async fn get_flow_state(&self, user_id: &str) -> Result<Option<FlowState>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, current_step, step_answers, completed, updated_at
                 FROM flow_states WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_flow_state: {e}")))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DatabaseError::Query(format!("get_flow_state: {e}"))),
        };

        let read = |e: libsql::Error| DatabaseError::Serialization(format!("get_flow_state: {e}"));
        let answers_str: String = row.get(2).map_err(read)?;
        let updated_str: String = row.get(4).map_err(read)?;
        Ok(Some(FlowState {
            user_id: row.get(0).map_err(read)?,
            current_step: row.get::<i64>(1).map_err(read)?.clamp(0, i64::from(u8::MAX)) as u8,
            step_answers: serde_json::from_str(&answers_str)
                .map_err(|e| DatabaseError::Serialization(format!("step_answers: {e}")))?,
            completed: row.get::<i64>(3).map_err(read)? != 0,
            updated_at: parse_datetime(&updated_str),
        }))
    }

    async fn save_flow_state(&self, state: &FlowState) -> Result<(), DatabaseError> {
        let answers = serde_json::to_string(&state.step_answers)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO flow_states (user_id, current_step, step_answers, completed, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id) DO UPDATE
                 SET current_step = ?2, step_answers = ?3, completed = ?4, updated_at = ?5",
                params![
                    state.user_id.as_str(),
                    i64::from(state.current_step),
                    answers,
                    i64::from(state.completed),
                    fmt_datetime(&state.updated_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_flow_state: {e}")))?;
        Ok(())
    }

    async fn prune_flow_states(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "DELETE FROM flow_states WHERE updated_at < ?1",
                params![fmt_datetime(&cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_flow_states: {e}")))?;
        Ok(count as usize)
    }

    async fn insert_workout(&self, workout: &WorkoutRecord) -> Result<(), DatabaseError> {
        let muscles = serde_json::to_string(&workout.target_muscles)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let plan = serde_json::to_string(&workout.plan)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO workouts (id, user_id, name, description, workout_type, duration_minutes,
                    difficulty_level, target_muscles, is_generated, ai_model_used, status, plan, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    workout.id.to_string(),
                    workout.user_id.as_str(),
                    workout.name.as_str(),
                    workout.description.as_str(),
                    workout.workout_type.as_str(),
                    opt_int(workout.duration_minutes),
                    opt_text(workout.difficulty_level.as_deref()),
                    muscles,
                    i64::from(workout.is_generated),
                    opt_text(workout.ai_model_used.as_deref()),
                    workout.status.as_str(),
                    plan,
                    fmt_datetime(&workout.created_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_workout: {e}")))?;
        Ok(())
    }

    async fn get_plan(&self, plan_type: &str) -> Result<Option<Plan>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT plan_type, price_id, name, monthly_price_cents FROM plans WHERE plan_type = ?1",
                params![plan_type],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_plan: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let read = |e: libsql::Error| DatabaseError::Serialization(format!("get_plan: {e}"));
                Ok(Some(Plan {
                    plan_type: row.get(0).map_err(read)?,
                    price_id: row.get(1).map_err(read)?,
                    name: row.get(2).map_err(read)?,
                    monthly_price_cents: row.get(3).map_err(read)?,
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_plan: {e}"))),
        }
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO subscriptions ({SUBSCRIPTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    subscription.id.to_string(),
                    subscription.user_id.as_str(),
                    subscription.provider_subscription_id.as_str(),
                    subscription.provider_customer_id.as_str(),
                    subscription.price_id.as_str(),
                    subscription.status.as_str(),
                    fmt_datetime(&subscription.created_at),
                    fmt_datetime(&subscription.updated_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_subscription: {e}")))?;
        Ok(())
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
        let after = after.map(|id| id.to_string()).unwrap_or_default();
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                     WHERE status IN ({}) AND id > ?1
                     ORDER BY id ASC LIMIT ?2",
                    status_list(statuses)
                ),
                params![after, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_subscriptions_page: {e}")))?;

        let mut page = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_subscriptions_page: {e}")))?
        {
            page.push(row_to_subscription(&row).map_err(|e| {
                DatabaseError::Serialization(format!("list_subscriptions_page: {e}"))
            })?);
        }
        Ok(page)
    }

    async fn set_subscription_status(
        &self,
        id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<(), DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE subscriptions SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), status.as_str(), fmt_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_subscription_status: {e}")))?;

        if count == 0 {
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
        let count = self
            .conn()
            .execute(
                "UPDATE subscriptions SET status = ?2, updated_at = ?3
                 WHERE provider_subscription_id = ?1",
                params![
                    provider_subscription_id,
                    status.as_str(),
                    fmt_datetime(&Utc::now())
                ],
            )
            .await
            .map_err(|e| {
                DatabaseError::Query(format!("set_subscription_status_by_provider_id: {e}"))
            })?;
        Ok(count as usize)
    }

    async fn find_user_id_by_email(&self, email: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM users WHERE lower(email) = lower(?1)",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_user_id_by_email: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_user_id_by_email: {e}"))),
        }
    }
}
