//! Injected authentication configuration.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;

use super::password::DEFAULT_BCRYPT_COST;

/// Access token lifetime: 30 minutes.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 30 * 60;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Consecutive password failures that trigger a lockout.
pub const MAX_LOGIN_FAILURES: i32 = 5;

/// Lockout duration: 30 minutes.
pub const LOCKOUT_DURATION_SECS: i64 = 30 * 60;

/// Code accepted by the static two-factor verifier unless configured otherwise.
pub const DEFAULT_TWO_FACTOR_CODE: &str = "123456";

/// How login and refresh hand tokens to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenDelivery {
    /// Tokens are fields of the JSON response body.
    #[default]
    Body,
    /// Tokens are set as httpOnly cookies and omitted from the body.
    Cookie,
}

impl FromStr for TokenDelivery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" => Ok(TokenDelivery::Body),
            "cookie" => Ok(TokenDelivery::Cookie),
            other => Err(format!("unknown token delivery '{other}' (expected body|cookie)")),
        }
    }
}

/// Secret, lifetimes and policy used by [`super::AuthService`].
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret.
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub token_delivery: TokenDelivery,
    /// Mark auth cookies `Secure`.
    pub secure_cookies: bool,
    pub max_login_failures: i32,
    pub lockout_duration: Duration,
    /// Code accepted by the default two-factor verifier.
    pub two_factor_code: String,
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    /// Defaults for everything except the signing secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            token_delivery: TokenDelivery::default(),
            secure_cookies: false,
            max_login_failures: MAX_LOGIN_FAILURES,
            lockout_duration: Duration::seconds(LOCKOUT_DURATION_SECS),
            two_factor_code: DEFAULT_TWO_FACTOR_CODE.to_string(),
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("token_delivery", &self.token_delivery)
            .field("secure_cookies", &self.secure_cookies)
            .field("max_login_failures", &self.max_login_failures)
            .field("lockout_duration", &self.lockout_duration)
            .field("two_factor_code", &"<redacted>")
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}
