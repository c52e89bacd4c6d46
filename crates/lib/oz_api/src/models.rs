//! Request and response bodies.
//!
//! Required request fields are `Option` so that a missing field surfaces as
//! a `validation_error` body instead of an extractor rejection.

use chrono::{DateTime, Utc};
use oz_core::auth::IssuedTokens;
use oz_core::models::auth::{Identity, Role, SessionTokenRecord, UserProfile};
use oz_core::models::chat::{ChatMessage, ChatSession, Sender};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    /// Seconds until a locked account may try again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub nickname: Option<String>,
    #[serde(default)]
    pub two_factor_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub detail: String,
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub role: Role,
    pub is_active: bool,
    pub two_factor_enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub two_factor_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Login and refresh response. Token fields are omitted in cookie delivery.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub detail: String,
    pub user_id: Uuid,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    pub fn new(detail: &str, user_id: Uuid, tokens: &IssuedTokens, include_tokens: bool) -> Self {
        Self {
            detail: detail.to_string(),
            user_id,
            token_type: "Bearer".to_string(),
            expires_in: tokens.access_ttl_secs,
            access_token: include_tokens.then(|| tokens.access_token.clone()),
            refresh_token: include_tokens.then(|| tokens.refresh_token.clone()),
        }
    }
}

/// A session record as shown to its owner. The token hash is never exposed.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionTokenResponse {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionTokenRecord> for SessionTokenResponse {
    fn from(r: SessionTokenRecord) -> Self {
        Self {
            id: r.id,
            issued_at: r.issued_at,
            expires_at: r.expires_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckEmailRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckEmailResponse {
    pub available: bool,
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub is_staff: bool,
    pub two_factor_enabled: bool,
    /// Profile fields are null once the profile has been deleted.
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MeResponse {
    pub fn new(identity: Identity, profile: Option<UserProfile>) -> Self {
        let (nickname, profile_image_url, last_login) = match profile {
            Some(p) => (Some(p.nickname), p.profile_image_url, p.last_login),
            None => (None, None, None),
        };
        Self {
            id: identity.id,
            email: identity.email,
            role: identity.role,
            is_active: identity.is_active,
            is_staff: identity.is_staff,
            two_factor_enabled: identity.two_factor_enabled,
            nickname,
            profile_image_url,
            last_login,
            created_at: identity.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub nickname: String,
    pub profile_image_url: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserProfile> for ProfileResponse {
    fn from(p: UserProfile) -> Self {
        Self {
            user_id: p.user_id,
            nickname: p.nickname,
            profile_image_url: p.profile_image_url,
            last_login: p.last_login,
            updated_at: p.updated_at,
        }
    }
}

/// Absent fields stay unchanged; an empty `profile_image_url` removes the image.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatSessionResponse {
    pub id: Uuid,
    /// Owner id.
    pub user: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatSession> for ChatSessionResponse {
    fn from(s: ChatSession) -> Self {
        Self {
            id: s.id,
            user: s.user_id,
            title: s.title,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatMessagesQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatMessageRequest {
    /// Target session id.
    pub session: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessageResponse {
    pub id: Uuid,
    pub session: Uuid,
    pub message: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageResponse {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            session: m.session_id,
            message: m.message,
            sender: m.sender,
            timestamp: m.timestamp,
        }
    }
}
