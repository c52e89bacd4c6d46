//! Inbound message handling on an authorized connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::authorizer::AuthorizedConnection;
use super::registry::Membership;
use super::{ChatError, ChatService};
use crate::models::chat::{ChatMessage, NewChatMessage, Sender};

/// Client → server frame.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub message: String,
}

/// Server → client frame.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame<'a> {
    pub message: &'a str,
}

/// Parse a text frame as `{"message": <string>}`.
pub fn parse_inbound(raw: &str) -> Result<InboundFrame, ChatError> {
    serde_json::from_str(raw).map_err(|e| ChatError::MalformedPayload(e.to_string()))
}

/// Per-connection relay state. Owns the broadcast membership.
pub struct RelayConnection {
    authorized: AuthorizedConnection,
    membership: Membership,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RelayConnection {
    pub fn authorized(&self) -> &AuthorizedConnection {
        &self.authorized
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Timestamp for the next message: never earlier than the previous one.
    fn next_timestamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}

impl ChatService {
    /// Join the session's broadcast group.
    ///
    /// The receiver yields serialized [`OutboundFrame`]s for this connection;
    /// it ends when the connection is evicted or the [`RelayConnection`] drops.
    pub fn admit(&self, authorized: AuthorizedConnection) -> (RelayConnection, mpsc::Receiver<String>) {
        let (membership, rx) = self.registry.join(authorized.session.id);
        let conn = RelayConnection {
            authorized,
            membership,
            last_timestamp: None,
        };
        (conn, rx)
    }

    /// Handle one inbound text frame: persist, then fan out to the group.
    ///
    /// [`ChatError::MalformedPayload`] leaves the connection usable; any
    /// other error should end it.
    pub async fn relay(&self, conn: &mut RelayConnection, raw: &str) -> Result<ChatMessage, ChatError> {
        let frame = parse_inbound(raw)?;
        let timestamp = conn.next_timestamp(Utc::now());
        let session_id = conn.authorized.session.id;

        let stored = self
            .store
            .append_chat_message(NewChatMessage {
                session_id,
                user_id: conn.authorized.caller.id,
                sender: Sender::User,
                message: frame.message,
                timestamp,
            })
            .await?;

        let payload = serde_json::to_string(&OutboundFrame {
            message: &stored.message,
        })
        .map_err(|e| ChatError::Internal(e.to_string()))?;
        let delivered = self.registry.broadcast(session_id, &payload);
        debug!(
            %session_id,
            message_id = %stored.id,
            delivered,
            "relayed chat message"
        );
        Ok(stored)
    }
}
