//! Token issuance, refresh rotation and revocation.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use super::jwt::{generate_token, verify_token};
use super::{AuthError, AuthService};
use crate::models::auth::{Identity, SessionTokenRecord};
use crate::uuid::uuidv7;

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub access_ttl_secs: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl AuthService {
    /// Sign an access/refresh pair and build the matching session record.
    fn sign_pair(&self, user_id: Uuid) -> Result<(IssuedTokens, SessionTokenRecord), AuthError> {
        let now = Utc::now();
        let (access_token, _) =
            generate_token(user_id, now, self.config.access_ttl, self.secret())?;
        let (refresh_token, refresh_claims) =
            generate_token(user_id, now, self.config.refresh_ttl, self.secret())?;

        let expires_at = DateTime::<Utc>::from_timestamp(refresh_claims.exp, 0)
            .ok_or_else(|| AuthError::Internal("refresh expiry out of range".into()))?;
        let issued_at = DateTime::<Utc>::from_timestamp(refresh_claims.iat, 0)
            .ok_or_else(|| AuthError::Internal("refresh issue time out of range".into()))?;

        let record = SessionTokenRecord {
            id: uuidv7(),
            user_id,
            token_hash: hash_refresh_token(&refresh_token),
            issued_at,
            expires_at,
        };
        let tokens = IssuedTokens {
            access_token,
            refresh_token,
            access_ttl_secs: self.config.access_ttl.num_seconds(),
            refresh_ttl_secs: self.config.refresh_ttl.num_seconds(),
            refresh_expires_at: expires_at,
        };
        Ok((tokens, record))
    }

    /// Issue a token pair for `user_id`, persisting exactly one session record.
    ///
    /// Tokens are only handed out once the record write has succeeded.
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedTokens, AuthError> {
        let (tokens, record) = self.sign_pair(user_id)?;
        self.store.insert_session_token(&record).await?;
        debug!(%user_id, record_id = %record.id, "issued token pair");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair (single-use rotation).
    pub async fn refresh(&self, refresh_token: &str) -> Result<(Identity, IssuedTokens), AuthError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(AuthError::Validation("refresh_token is required".into()));
        }
        let claims = verify_token(refresh_token, self.secret())?;

        let identity = self
            .store
            .find_identity_by_id(claims.user_id)
            .await?
            .ok_or_else(|| AuthError::AuthenticationFailed("user not found".into()))?;

        let (tokens, record) = self.sign_pair(identity.id)?;
        let rotated = self
            .store
            .rotate_session_token(&hash_refresh_token(refresh_token), &record)
            .await?;
        if !rotated {
            return Err(AuthError::AuthenticationFailed(
                "refresh token revoked or expired".into(),
            ));
        }

        info!(user_id = %identity.id, "refresh token rotated");
        Ok((identity, tokens))
    }

    /// Logout everywhere: delete every session record of `user_id`.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let removed = self.store.delete_session_tokens_for_user(user_id).await?;
        info!(%user_id, removed, "revoked all refresh tokens");
        Ok(removed)
    }

    /// Unexpired session records of `actor`, newest first.
    pub async fn session_tokens(
        &self,
        actor: &Identity,
    ) -> Result<Vec<SessionTokenRecord>, AuthError> {
        Ok(self.store.list_session_tokens(actor.id).await?)
    }

    /// One session record, visible to its owner only.
    pub async fn session_token(
        &self,
        actor: &Identity,
        record_id: Uuid,
    ) -> Result<SessionTokenRecord, AuthError> {
        let record = self
            .store
            .find_session_token(record_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Token not found".into()))?;
        if record.user_id != actor.id {
            return Err(AuthError::Forbidden("Cannot access another user's token".into()));
        }
        Ok(record)
    }

    /// Single-device logout: delete one of `actor`'s session records.
    pub async fn revoke_token(&self, actor: &Identity, record_id: Uuid) -> Result<(), AuthError> {
        let record = self.session_token(actor, record_id).await?;
        let removed = self.store.delete_session_token(record.id).await?;
        debug!(user_id = %actor.id, record_id = %record.id, removed, "revoked refresh token");
        Ok(())
    }
}
