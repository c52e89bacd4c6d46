//! Storage collaborators.
//!
//! The auth and chat services only talk to storage through these traits.
//! [`pg::PgStore`] is the production implementation; [`memory::MemoryStore`]
//! backs tests and `--memory-store` runs.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{Identity, NewIdentity, ProfileUpdate, SessionTokenRecord, UserProfile};
use crate::models::chat::{ChatMessage, ChatSession, NewChatMessage};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identity and profile records.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert an identity and its profile as one unit.
    async fn create_identity(&self, new: NewIdentity) -> StoreResult<(Identity, UserProfile)>;

    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>>;

    async fn find_identity_by_id(&self, id: Uuid) -> StoreResult<Option<Identity>>;

    async fn email_exists(&self, email: &str) -> StoreResult<bool>;

    /// Count a failed password check, unless the identity is locked at `now`.
    ///
    /// Check and increment are one atomic step. When the incremented count
    /// reaches `max_failures`, `locked_until` is set to `lock_until`. Returns
    /// the updated identity, or `None` without writing anything when no
    /// unlocked identity matched.
    async fn record_login_failure(
        &self,
        id: Uuid,
        max_failures: i32,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> StoreResult<Option<Identity>>;

    /// Reset the failure counter and stamp the profile's `last_login` with
    /// `now`, unless the identity is locked at `now`.
    ///
    /// Returns `false` without writing anything when no unlocked identity
    /// matched.
    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>>;

    /// Apply `update` to the profile of `user_id`. `None` when there is no profile.
    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<UserProfile>>;

    /// Delete the profile of `user_id`. Returns `false` when there was none.
    async fn delete_profile(&self, user_id: Uuid) -> StoreResult<bool>;
}

/// Refresh-token records.
#[async_trait]
pub trait SessionTokenStore: Send + Sync {
    /// Persist a record. Expired records of the same identity are purged first.
    async fn insert_session_token(&self, record: &SessionTokenRecord) -> StoreResult<()>;

    async fn find_session_token(&self, id: Uuid) -> StoreResult<Option<SessionTokenRecord>>;

    /// Unexpired records owned by `user_id`, newest first.
    async fn list_session_tokens(&self, user_id: Uuid) -> StoreResult<Vec<SessionTokenRecord>>;

    /// Delete the record matching `old_hash` and insert `replacement` in one
    /// transaction. Returns `false` (and writes nothing) when no unexpired
    /// record matched.
    async fn rotate_session_token(
        &self,
        old_hash: &str,
        replacement: &SessionTokenRecord,
    ) -> StoreResult<bool>;

    /// Delete one record by id. Returns the number removed.
    async fn delete_session_token(&self, id: Uuid) -> StoreResult<u64>;

    /// Delete every record owned by `user_id`. Returns the number removed.
    async fn delete_session_tokens_for_user(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// Everything the auth service needs from storage.
pub trait AuthStore: IdentityStore + SessionTokenStore {}

impl<T: IdentityStore + SessionTokenStore> AuthStore for T {}

/// Chat sessions and their message log.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_chat_session(&self, user_id: Uuid, title: &str) -> StoreResult<ChatSession>;

    async fn find_chat_session(&self, id: Uuid) -> StoreResult<Option<ChatSession>>;

    /// Sessions owned by `user_id`, newest first.
    async fn list_chat_sessions(&self, user_id: Uuid) -> StoreResult<Vec<ChatSession>>;

    async fn append_chat_message(&self, new: NewChatMessage) -> StoreResult<ChatMessage>;

    /// Messages of a session in non-decreasing timestamp order.
    async fn list_chat_messages(&self, session_id: Uuid) -> StoreResult<Vec<ChatMessage>>;
}
