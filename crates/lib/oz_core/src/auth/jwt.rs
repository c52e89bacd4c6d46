//! JWT token generation and verification.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::info;
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::TokenClaims;

/// Sign a token for `user_id` issued at `issued_at` and valid for `ttl` (HS256).
pub fn generate_token(
    user_id: Uuid,
    issued_at: DateTime<Utc>,
    ttl: Duration,
    secret: &[u8],
) -> Result<(String, TokenClaims), AuthError> {
    let claims = TokenClaims {
        user_id,
        iat: issued_at.timestamp(),
        exp: (issued_at + ttl).timestamp(),
        jti: Uuid::new_v4(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
    Ok((token, claims))
}

/// Verify signature and expiry, returning the claims on success.
///
/// Any failure (bad signature, malformed, expired) is `AuthenticationFailed`.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<TokenClaims, AuthError> {
    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp"]);
    decode::<TokenClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::AuthenticationFailed(format!("invalid token: {e}")))
}

/// Resolve the JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("oz")
        .join("jwt-secret")
}
