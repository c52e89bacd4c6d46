//! Per-request identity resolution.
//!
//! Resolution order: `Authorization: Bearer <token>` header, then the access
//! cookie. No credential at all means an anonymous caller; a credential that
//! fails verification is always an error.

use tracing::debug;

use super::jwt::verify_token;
use super::{AuthError, AuthService};
use crate::models::auth::Identity;

/// Extract the token from an `Authorization` header value.
///
/// The scheme must be `Bearer` (case-insensitive) followed by exactly one token.
pub fn bearer_token(header: &str) -> Result<&str, AuthError> {
    let (scheme, token) = header
        .trim()
        .split_once(' ')
        .ok_or_else(|| AuthError::AuthenticationFailed("Invalid authorization header".into()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::AuthenticationFailed(
            "Authorization scheme must be Bearer".into(),
        ));
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::AuthenticationFailed(
            "Invalid authorization header".into(),
        ));
    }
    Ok(token)
}

impl AuthService {
    /// Resolve the caller from an optional `Authorization` header value and an
    /// optional access-cookie value.
    ///
    /// Returns `Ok(None)` only when neither carries a credential.
    pub async fn resolve(
        &self,
        authorization: Option<&str>,
        access_cookie: Option<&str>,
    ) -> Result<Option<Identity>, AuthError> {
        let token = match authorization {
            Some(header) => bearer_token(header)?,
            None => match access_cookie.map(str::trim).filter(|c| !c.is_empty()) {
                Some(cookie) => cookie,
                None => return Ok(None),
            },
        };
        self.identity_for_token(token).await.map(Some)
    }

    /// Verify `token` and load the identity it names.
    pub async fn identity_for_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = verify_token(token, self.secret())?;
        let identity = self
            .store
            .find_identity_by_id(claims.user_id)
            .await?
            .ok_or_else(|| {
                debug!(user_id = %claims.user_id, "token names a missing user");
                AuthError::AuthenticationFailed("Invalid token".into())
            })?;
        Ok(identity)
    }
}
