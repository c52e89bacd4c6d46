//! Admission of persistent chat connections.
//!
//! A [`ConnectionAttempt`] is the pending state: the caller resolved at
//! upgrade time (if any) plus the raw session id from the path.
//! [`ChatService::authorize`] moves it to either [`Admission::Authorized`] or
//! [`Admission::Rejected`].

use tracing::debug;
use uuid::Uuid;

use super::{ChatError, ChatService};
use crate::models::auth::Identity;
use crate::models::chat::ChatSession;

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unauthenticated,
    NotFound,
    Forbidden,
}

impl RejectReason {
    /// WebSocket close code sent to the client.
    pub fn close_code(self) -> u16 {
        match self {
            RejectReason::Unauthenticated => 4401,
            RejectReason::NotFound => 4404,
            RejectReason::Forbidden => 4403,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Unauthenticated => "unauthenticated",
            RejectReason::NotFound => "not_found",
            RejectReason::Forbidden => "forbidden",
        }
    }
}

/// A connection that has not been checked yet.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub caller: Option<Identity>,
    pub session_id: String,
}

impl ConnectionAttempt {
    pub fn new(caller: Option<Identity>, session_id: impl Into<String>) -> Self {
        Self {
            caller,
            session_id: session_id.into(),
        }
    }
}

/// A connection whose caller owns the target session.
#[derive(Debug, Clone)]
pub struct AuthorizedConnection {
    pub session: ChatSession,
    pub caller: Identity,
}

#[derive(Debug, Clone)]
pub enum Admission {
    Authorized(AuthorizedConnection),
    Rejected(RejectReason),
}

impl ChatService {
    /// Decide whether `attempt` may join its session's broadcast group.
    ///
    /// Only storage failures surface as `Err`.
    pub async fn authorize(&self, attempt: ConnectionAttempt) -> Result<Admission, ChatError> {
        let Some(caller) = attempt.caller else {
            debug!("chat connection rejected: anonymous caller");
            return Ok(Admission::Rejected(RejectReason::Unauthenticated));
        };
        let Ok(session_id) = Uuid::parse_str(attempt.session_id.trim()) else {
            return Ok(Admission::Rejected(RejectReason::NotFound));
        };
        let Some(session) = self.store.find_chat_session(session_id).await? else {
            debug!(%session_id, user_id = %caller.id, "chat connection rejected: unknown session");
            return Ok(Admission::Rejected(RejectReason::NotFound));
        };
        if session.user_id != caller.id {
            debug!(%session_id, user_id = %caller.id, "chat connection rejected: not the owner");
            return Ok(Admission::Rejected(RejectReason::Forbidden));
        }
        Ok(Admission::Authorized(AuthorizedConnection { session, caller }))
    }
}
