//! Chat domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who produced a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The session owner, typing into a client.
    User,
    /// An automated agent replying in the session.
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Ai => "ai",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "ai" => Ok(Sender::Ai),
            other => Err(format!("unknown sender '{other}'")),
        }
    }
}

/// A conversation container owned by exactly one identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only log entry within a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub sender: Sender,
    pub message: String,
    pub is_important: bool,
    /// Logical send time, assigned when the message was accepted.
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to append a chat message.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub sender: Sender,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
