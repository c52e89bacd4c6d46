//! In-memory storage.
//!
//! Implements every storage trait behind a single async mutex, so each
//! operation is atomic with respect to the others. Used by tests and by the
//! server's `--memory-store` mode.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ChatStore, IdentityStore, SessionTokenStore, StoreError, StoreResult};
use crate::models::auth::{Identity, NewIdentity, ProfileUpdate, SessionTokenRecord, UserProfile};
use crate::models::chat::{ChatMessage, ChatSession, NewChatMessage};
use crate::uuid::uuidv7;

#[derive(Default)]
struct Inner {
    identities: HashMap<Uuid, Identity>,
    profiles: HashMap<Uuid, UserProfile>,
    session_tokens: Vec<SessionTokenRecord>,
    chat_sessions: HashMap<Uuid, ChatSession>,
    chat_messages: Vec<ChatMessage>,
}

/// Process-local storage with the same semantics as [`super::PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an identity's lockout expiry.
    #[cfg(test)]
    pub async fn set_locked_until(&self, id: Uuid, until: Option<DateTime<Utc>>) {
        if let Some(identity) = self.inner.lock().await.identities.get_mut(&id) {
            identity.locked_until = until;
        }
    }

    /// Number of refresh-token records currently held for `user_id`.
    #[cfg(test)]
    pub async fn session_token_count(&self, user_id: Uuid) -> usize {
        self.inner
            .lock()
            .await
            .session_tokens
            .iter()
            .filter(|r| r.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn create_identity(&self, new: NewIdentity) -> StoreResult<(Identity, UserProfile)> {
        let mut inner = self.inner.lock().await;
        if inner.identities.values().any(|i| i.email == new.email) {
            return Err(StoreError::Conflict("email already registered".into()));
        }
        let now = Utc::now();
        let identity = Identity {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            is_active: true,
            is_staff: false,
            two_factor_enabled: new.two_factor_enabled,
            login_fail_count: 0,
            locked_until: None,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        };
        let profile = UserProfile {
            user_id: identity.id,
            nickname: new.nickname,
            profile_image_url: None,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        inner.identities.insert(identity.id, identity.clone());
        inner.profiles.insert(identity.id, profile.clone());
        Ok((identity, profile))
    }

    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let inner = self.inner.lock().await;
        Ok(inner.identities.values().find(|i| i.email == email).cloned())
    }

    async fn find_identity_by_id(&self, id: Uuid) -> StoreResult<Option<Identity>> {
        Ok(self.inner.lock().await.identities.get(&id).cloned())
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.identities.values().any(|i| i.email == email))
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        max_failures: i32,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> StoreResult<Option<Identity>> {
        let mut inner = self.inner.lock().await;
        let Some(identity) = inner.identities.get_mut(&id) else {
            return Ok(None);
        };
        if identity.lockout_remaining(now).is_some() {
            return Ok(None);
        }
        identity.login_fail_count += 1;
        if identity.login_fail_count >= max_failures {
            identity.locked_until = Some(lock_until);
        }
        identity.updated_at = Utc::now();
        Ok(Some(identity.clone()))
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let Some(identity) = inner.identities.get_mut(&id) else {
            return Ok(false);
        };
        if identity.lockout_remaining(now).is_some() {
            return Ok(false);
        }
        identity.login_fail_count = 0;
        identity.locked_until = None;
        identity.updated_at = Utc::now();
        if let Some(profile) = inner.profiles.get_mut(&id) {
            profile.last_login = Some(now);
            profile.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let identity = inner
            .identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        identity.password_hash = password_hash.to_string();
        identity.password_changed_at = Some(changed_at);
        identity.updated_at = Utc::now();
        Ok(())
    }

    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        Ok(self.inner.lock().await.profiles.get(&user_id).cloned())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<UserProfile>> {
        let mut inner = self.inner.lock().await;
        let Some(profile) = inner.profiles.get_mut(&user_id) else {
            return Ok(None);
        };
        if let Some(nickname) = &update.nickname {
            profile.nickname = nickname.clone();
        }
        if let Some(url) = &update.profile_image_url {
            profile.profile_image_url = url.clone();
        }
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }

    async fn delete_profile(&self, user_id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.lock().await.profiles.remove(&user_id).is_some())
    }
}

#[async_trait]
impl SessionTokenStore for MemoryStore {
    async fn insert_session_token(&self, record: &SessionTokenRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        inner
            .session_tokens
            .retain(|r| r.user_id != record.user_id || r.expires_at > now);
        if inner
            .session_tokens
            .iter()
            .any(|r| r.token_hash == record.token_hash)
        {
            return Err(StoreError::Conflict("refresh token already recorded".into()));
        }
        inner.session_tokens.push(record.clone());
        Ok(())
    }

    async fn find_session_token(&self, id: Uuid) -> StoreResult<Option<SessionTokenRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.session_tokens.iter().find(|r| r.id == id).cloned())
    }

    async fn list_session_tokens(&self, user_id: Uuid) -> StoreResult<Vec<SessionTokenRecord>> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        let mut records: Vec<SessionTokenRecord> = inner
            .session_tokens
            .iter()
            .filter(|r| r.user_id == user_id && r.expires_at > now)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn rotate_session_token(
        &self,
        old_hash: &str,
        replacement: &SessionTokenRecord,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let Some(pos) = inner.session_tokens.iter().position(|r| {
            r.token_hash == old_hash && r.user_id == replacement.user_id && r.expires_at > now
        }) else {
            return Ok(false);
        };
        inner.session_tokens.remove(pos);
        inner
            .session_tokens
            .retain(|r| r.user_id != replacement.user_id || r.expires_at > now);
        inner.session_tokens.push(replacement.clone());
        Ok(true)
    }

    async fn delete_session_token(&self, id: Uuid) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.session_tokens.len();
        inner.session_tokens.retain(|r| r.id != id);
        Ok((before - inner.session_tokens.len()) as u64)
    }

    async fn delete_session_tokens_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.session_tokens.len();
        inner.session_tokens.retain(|r| r.user_id != user_id);
        Ok((before - inner.session_tokens.len()) as u64)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn create_chat_session(&self, user_id: Uuid, title: &str) -> StoreResult<ChatSession> {
        let mut inner = self.inner.lock().await;
        if !inner.identities.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        let now = Utc::now();
        let session = ChatSession {
            id: uuidv7(),
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        inner.chat_sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_chat_session(&self, id: Uuid) -> StoreResult<Option<ChatSession>> {
        Ok(self.inner.lock().await.chat_sessions.get(&id).cloned())
    }

    async fn list_chat_sessions(&self, user_id: Uuid) -> StoreResult<Vec<ChatSession>> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<ChatSession> = inner
            .chat_sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn append_chat_message(&self, new: NewChatMessage) -> StoreResult<ChatMessage> {
        let mut inner = self.inner.lock().await;
        if !inner.chat_sessions.contains_key(&new.session_id) {
            return Err(StoreError::NotFound(format!("chat session {}", new.session_id)));
        }
        let message = ChatMessage {
            id: uuidv7(),
            session_id: new.session_id,
            user_id: new.user_id,
            sender: new.sender,
            message: new.message,
            is_important: false,
            timestamp: new.timestamp,
            created_at: Utc::now(),
        };
        inner.chat_messages.push(message.clone());
        Ok(message)
    }

    async fn list_chat_messages(&self, session_id: Uuid) -> StoreResult<Vec<ChatMessage>> {
        let inner = self.inner.lock().await;
        let mut messages: Vec<ChatMessage> = inner
            .chat_messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(messages)
    }
}
