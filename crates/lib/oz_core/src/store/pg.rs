//! PostgreSQL-backed storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ChatStore, IdentityStore, SessionTokenStore, StoreError, StoreResult};
use crate::models::auth::{Identity, NewIdentity, ProfileUpdate, SessionTokenRecord, UserProfile};
use crate::models::chat::{ChatMessage, ChatSession, NewChatMessage};
use crate::uuid::uuidv7;

const IDENTITY_COLUMNS: &str = "id, email, password_hash, role, is_active, is_staff, \
     two_factor_enabled, login_fail_count, locked_until, password_changed_at, \
     created_at, updated_at";

const PROFILE_COLUMNS: &str =
    "user_id, nickname, profile_image_url, last_login, created_at, updated_at";

const SESSION_TOKEN_COLUMNS: &str = "id, user_id, token_hash, issued_at, expires_at";

const MESSAGE_COLUMNS: &str =
    "id, session_id, user_id, sender, message, is_important, timestamp, created_at";

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    is_staff: bool,
    two_factor_enabled: bool,
    login_fail_count: i32,
    locked_until: Option<DateTime<Utc>>,
    password_changed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        Ok(Identity {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            is_active: row.is_active,
            is_staff: row.is_staff,
            two_factor_enabled: row.two_factor_enabled,
            login_fail_count: row.login_fail_count,
            locked_until: row.locked_until,
            password_changed_at: row.password_changed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    nickname: String,
    profile_image_url: Option<String>,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        UserProfile {
            user_id: row.user_id,
            nickname: row.nickname,
            profile_image_url: row.profile_image_url,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SessionTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionTokenRow> for SessionTokenRecord {
    fn from(row: SessionTokenRow) -> Self {
        SessionTokenRecord {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    session_id: Uuid,
    user_id: Uuid,
    sender: String,
    message: String,
    is_important: bool,
    timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            sender: row.sender.parse().map_err(StoreError::Corrupt)?,
            message: row.message,
            is_important: row.is_important,
            timestamp: row.timestamp,
            created_at: row.created_at,
        })
    }
}

/// Map unique-constraint violations to [`StoreError::Conflict`].
fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Conflict(what.to_string()),
        _ => StoreError::Db(e),
    }
}

/// Storage backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn create_identity(&self, new: NewIdentity) -> StoreResult<(Identity, UserProfile)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "INSERT INTO users (email, password_hash, role, two_factor_enabled) \
             VALUES ($1, $2, $3, $4) RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .bind(new.two_factor_enabled)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_or_db(e, "email already registered"))?;

        let profile = sqlx::query_as::<_, ProfileRow>(&format!(
            "INSERT INTO user_profiles (user_id, nickname) VALUES ($1, $2) \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(row.id)
        .bind(&new.nickname)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((Identity::try_from(row)?, profile.into()))
    }

    async fn find_identity_by_email(&self, email: &str) -> StoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn find_identity_by_id(&self, id: Uuid) -> StoreResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn email_exists(&self, email: &str) -> StoreResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        max_failures: i32,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> StoreResult<Option<Identity>> {
        // Right-hand sides see the pre-update row, and a concurrent writer
        // makes the WHERE clause re-check the committed row, so the lock test
        // and the increment are one atomic step.
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "UPDATE users SET \
                 login_fail_count = login_fail_count + 1, \
                 locked_until = CASE WHEN login_fail_count + 1 >= $2 THEN $4 \
                                     ELSE locked_until END, \
                 updated_at = now() \
             WHERE id = $1 AND (locked_until IS NULL OR locked_until <= $3) \
             RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(id)
        .bind(max_failures)
        .bind(now)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let reset = sqlx::query(
            "UPDATE users SET login_fail_count = 0, locked_until = NULL, updated_at = now() \
             WHERE id = $1 AND (locked_until IS NULL OR locked_until <= $2)",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if reset == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        sqlx::query("UPDATE user_profiles SET last_login = $2, updated_at = now() WHERE user_id = $1")
            .bind(id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, password_changed_at = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    async fn find_profile(&self, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserProfile::from))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> StoreResult<Option<UserProfile>> {
        let (set_image, image) = match &update.profile_image_url {
            Some(url) => (true, url.clone()),
            None => (false, None),
        };
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE user_profiles SET \
                 nickname = COALESCE($2, nickname), \
                 profile_image_url = CASE WHEN $3 THEN $4 ELSE profile_image_url END, \
                 updated_at = now() \
             WHERE user_id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(update.nickname.as_deref())
        .bind(set_image)
        .bind(image)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserProfile::from))
    }

    async fn delete_profile(&self, user_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM user_profiles WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionTokenStore for PgStore {
    async fn insert_session_token(&self, record: &SessionTokenRecord) -> StoreResult<()> {
        sqlx::query(
            "WITH purged AS ( \
                 DELETE FROM session_tokens WHERE user_id = $2 AND expires_at <= now() \
             ) \
             INSERT INTO session_tokens (id, user_id, token_hash, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "refresh token already recorded"))?;
        Ok(())
    }

    async fn find_session_token(&self, id: Uuid) -> StoreResult<Option<SessionTokenRecord>> {
        let row = sqlx::query_as::<_, SessionTokenRow>(&format!(
            "SELECT {SESSION_TOKEN_COLUMNS} FROM session_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(SessionTokenRecord::from))
    }

    async fn list_session_tokens(&self, user_id: Uuid) -> StoreResult<Vec<SessionTokenRecord>> {
        let rows = sqlx::query_as::<_, SessionTokenRow>(&format!(
            "SELECT {SESSION_TOKEN_COLUMNS} FROM session_tokens \
             WHERE user_id = $1 AND expires_at > now() \
             ORDER BY issued_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionTokenRecord::from).collect())
    }

    async fn rotate_session_token(
        &self,
        old_hash: &str,
        replacement: &SessionTokenRecord,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM session_tokens \
             WHERE token_hash = $1 AND user_id = $2 AND expires_at > now()",
        )
        .bind(old_hash)
        .bind(replacement.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM session_tokens WHERE user_id = $1 AND expires_at <= now()")
            .bind(replacement.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO session_tokens (id, user_id, token_hash, issued_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(replacement.id)
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.issued_at)
        .bind(replacement.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete_session_token(&self, id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_session_tokens_for_user(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn create_chat_session(&self, user_id: Uuid, title: &str) -> StoreResult<ChatSession> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>)>(
            "INSERT INTO chat_sessions (id, user_id, title) VALUES ($1, $2, $3) \
             RETURNING id, user_id, title, created_at, updated_at",
        )
        .bind(uuidv7())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await?;
        Ok(session_from_tuple(row))
    }

    async fn find_chat_session(&self, id: Uuid) -> StoreResult<Option<ChatSession>> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT id, user_id, title, created_at, updated_at FROM chat_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(session_from_tuple))
    }

    async fn list_chat_sessions(&self, user_id: Uuid) -> StoreResult<Vec<ChatSession>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT id, user_id, title, created_at, updated_at FROM chat_sessions \
             WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(session_from_tuple).collect())
    }

    async fn append_chat_message(&self, new: NewChatMessage) -> StoreResult<ChatMessage> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "INSERT INTO chat_messages (id, session_id, user_id, sender, message, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(uuidv7())
        .bind(new.session_id)
        .bind(new.user_id)
        .bind(new.sender.as_str())
        .bind(&new.message)
        .bind(new.timestamp)
        .fetch_one(&self.pool)
        .await?;
        ChatMessage::try_from(row)
    }

    async fn list_chat_messages(&self, session_id: Uuid) -> StoreResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages \
             WHERE session_id = $1 ORDER BY timestamp ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ChatMessage::try_from).collect()
    }
}

fn session_from_tuple(
    (id, user_id, title, created_at, updated_at): (Uuid, Uuid, String, DateTime<Utc>, DateTime<Utc>),
) -> ChatSession {
    ChatSession {
        id,
        user_id,
        title,
        created_at,
        updated_at,
    }
}
