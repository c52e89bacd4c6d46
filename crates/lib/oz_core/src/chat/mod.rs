//! Chat sessions, history and real-time relay.
//!
//! [`ChatService`] serves the REST history operations and, through
//! [`authorizer`] and [`relay`], the persistent per-session connections.
//! Fan-out goes through a shared [`BroadcastRegistry`].

pub mod authorizer;
pub mod registry;
pub mod relay;

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::auth::Identity;
use crate::models::chat::{ChatMessage, ChatSession, NewChatMessage, Sender};
use crate::store::{ChatStore, StoreError};

pub use authorizer::{Admission, AuthorizedConnection, ConnectionAttempt, RejectReason};
pub use registry::{BroadcastRegistry, Membership};
pub use relay::{InboundFrame, OutboundFrame, RelayConnection};

/// Maximum chat session title length, in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// Chat errors.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Chat service. Cheap to clone.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    registry: Arc<BroadcastRegistry>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self::with_registry(store, Arc::new(BroadcastRegistry::default()))
    }

    pub fn with_registry(store: Arc<dyn ChatStore>, registry: Arc<BroadcastRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &Arc<BroadcastRegistry> {
        &self.registry
    }

    /// Create a session owned by `owner`.
    pub async fn create_session(&self, owner: &Identity, title: &str) -> Result<ChatSession, ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::Validation("title is required".into()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ChatError::Validation(format!(
                "title must be at most {MAX_TITLE_LEN} characters"
            )));
        }
        let session = self.store.create_chat_session(owner.id, title).await?;
        info!(session_id = %session.id, user_id = %owner.id, "chat session created");
        Ok(session)
    }

    /// Sessions owned by `owner`, newest first.
    pub async fn list_sessions(&self, owner: &Identity) -> Result<Vec<ChatSession>, ChatError> {
        Ok(self.store.list_chat_sessions(owner.id).await?)
    }

    /// History of a session in timestamp order.
    ///
    /// A missing, malformed or unknown session id yields an empty list;
    /// someone else's session is `Forbidden`.
    pub async fn list_messages(
        &self,
        caller: &Identity,
        session_id: Option<&str>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let Some(session_id) = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return Ok(Vec::new());
        };
        let Some(session) = self.store.find_chat_session(session_id).await? else {
            return Ok(Vec::new());
        };
        if session.user_id != caller.id {
            return Err(ChatError::Forbidden(
                "You do not have permission to view this chat session".into(),
            ));
        }
        Ok(self.store.list_chat_messages(session_id).await?)
    }

    /// Append a user message to one of the caller's sessions.
    ///
    /// Unknown and foreign sessions are both reported as validation errors.
    pub async fn post_message(
        &self,
        caller: &Identity,
        session_id: Uuid,
        message: &str,
    ) -> Result<ChatMessage, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::Validation("message is required".into()));
        }
        let owned = self
            .store
            .find_chat_session(session_id)
            .await?
            .is_some_and(|s| s.user_id == caller.id);
        if !owned {
            return Err(ChatError::Validation(
                "You do not have permission to post to this chat session".into(),
            ));
        }
        let stored = self
            .store
            .append_chat_message(NewChatMessage {
                session_id,
                user_id: caller.id,
                sender: Sender::User,
                message: message.to_string(),
                timestamp: Utc::now(),
            })
            .await?;
        Ok(stored)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_support::{chat_service, identity};

    #[tokio::test]
    async fn sessions_are_listed_per_owner() {
        let (chat, store) = chat_service();
        let me = identity(&store, "me@example.com").await;
        let other = identity(&store, "other@example.com").await;

        chat.create_session(&me, "first").await.unwrap();
        chat.create_session(&me, "second").await.unwrap();
        chat.create_session(&other, "theirs").await.unwrap();

        let titles: Vec<String> = chat
            .list_sessions(&me)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, ["second", "first"]);
    }

    #[tokio::test]
    async fn session_title_is_validated() {
        let (chat, store) = chat_service();
        let me = identity(&store, "title@example.com").await;
        assert!(matches!(
            chat.create_session(&me, "  ").await,
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            chat.create_session(&me, &"x".repeat(MAX_TITLE_LEN + 1)).await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn history_rules() {
        let (chat, store) = chat_service();
        let me = identity(&store, "hist@example.com").await;
        let other = identity(&store, "nosy@example.com").await;
        let session = chat.create_session(&me, "history").await.unwrap();

        let posted = chat.post_message(&me, session.id, "Hello, world!").await.unwrap();
        assert_eq!(posted.sender, Sender::User);

        let sid = session.id.to_string();
        let history = chat.list_messages(&me, Some(&sid)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "Hello, world!");

        assert!(chat.list_messages(&me, None).await.unwrap().is_empty());
        assert!(chat.list_messages(&me, Some("nope")).await.unwrap().is_empty());
        let unknown = Uuid::new_v4().to_string();
        assert!(chat.list_messages(&me, Some(&unknown)).await.unwrap().is_empty());
        assert!(matches!(
            chat.list_messages(&other, Some(&sid)).await,
            Err(ChatError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn posting_to_foreign_or_unknown_session_is_rejected() {
        let (chat, store) = chat_service();
        let me = identity(&store, "poster@example.com").await;
        let other = identity(&store, "owner2@example.com").await;
        let theirs = chat.create_session(&other, "theirs").await.unwrap();

        assert!(matches!(
            chat.post_message(&me, theirs.id, "Hi there!").await,
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            chat.post_message(&me, Uuid::new_v4(), "Hi there!").await,
            Err(ChatError::Validation(_))
        ));
    }
}
