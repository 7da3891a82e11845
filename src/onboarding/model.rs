//! Conversation and message models for the coach dialogue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to sessions the coach creates.
pub const DEFAULT_SESSION_TITLE: &str = "FitCraft Coach Session";

/// Lifecycle of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// A coach conversation owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub status: SessionStatus,
    pub message_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConversationSession {
    /// A new, empty, active session.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            status: SessionStatus::Active,
            message_count: 0,
            last_message_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Assistant,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Author {
        match s {
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

/// An immutable, append-only conversation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub author: Author,
    pub content: String,
    /// Flow step the message was written at.
    pub step_at_time: u8,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: Uuid, author: Author, content: impl Into<String>, step: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            author,
            content: content.into(),
            step_at_time: step,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_defaults() {
        let session = ConversationSession::new("u1");
        assert_eq!(session.title, DEFAULT_SESSION_TITLE);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.message_count, 0);
        assert!(session.last_message_at.is_none());
    }

    #[test]
    fn session_status_strings_match_serde() {
        for status in [SessionStatus::Active, SessionStatus::Completed, SessionStatus::Archived] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn author_roundtrip() {
        assert_eq!(Author::parse(Author::Assistant.as_str()), Author::Assistant);
        assert_eq!(Author::parse(Author::User.as_str()), Author::User);
    }
}
