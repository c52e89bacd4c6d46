//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! structs in `oz_api::models`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role attached to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Moderator => "moderator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Authenticated user record: credentials, role and lockout state.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    /// Normalized (trimmed, lower-cased) email.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub is_staff: bool,
    pub two_factor_enabled: bool,
    /// Consecutive failed password checks since the last success.
    pub login_fail_count: i32,
    /// Password checks are refused while this lies in the future.
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Remaining lockout at `now`, or `None` when password checks are allowed.
    pub fn lockout_remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.locked_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }
}

/// Fields required to create an identity together with its profile.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub role: Role,
    pub two_factor_enabled: bool,
}

/// Per-identity profile, created alongside the identity at signup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub nickname: String,
    pub profile_image_url: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields to overwrite. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    /// `Some(None)` clears the image.
    pub profile_image_url: Option<Option<String>>,
}

/// Server-side record of an issued refresh token.
///
/// Only the SHA-256 digest of the token is stored.
#[derive(Debug, Clone)]
pub struct SessionTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// JWT claims carried by both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity the token was issued to.
    pub user_id: Uuid,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Random token id; keeps tokens minted in the same second distinct.
    pub jti: Uuid,
}

/// Trim and lower-case an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_known_values() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!("moderator".parse::<Role>(), Ok(Role::Moderator));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn lockout_remaining_ignores_past_expiry() {
        let now = Utc::now();
        let mut identity = Identity {
            id: Uuid::new_v4(),
            email: "a@b.c".into(),
            password_hash: String::new(),
            role: Role::User,
            is_active: true,
            is_staff: false,
            two_factor_enabled: false,
            login_fail_count: 5,
            locked_until: Some(now - chrono::Duration::seconds(1)),
            password_changed_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(identity.lockout_remaining(now).is_none());

        identity.locked_until = Some(now + chrono::Duration::minutes(10));
        let remaining = identity.lockout_remaining(now).expect("locked");
        assert_eq!(remaining.num_minutes(), 10);
    }
}
