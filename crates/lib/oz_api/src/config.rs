//! API server configuration.

use oz_core::auth::jwt::resolve_jwt_secret;
use oz_core::auth::{AuthConfig, TokenDelivery};
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Secret, token lifetimes, delivery mode and lockout policy.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                            |
    /// |------------------------------|------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:8000`                   |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/oz`     |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file      |
    /// | `TOKEN_DELIVERY`             | `body` (`body` or `cookie`)        |
    /// | `SECURE_COOKIE`              | `false`                            |
    /// | `TWO_FACTOR_CODE`            | `123456`                           |
    pub fn from_env() -> Self {
        let mut auth = AuthConfig::new(resolve_jwt_secret());
        if let Ok(raw) = std::env::var("TOKEN_DELIVERY") {
            match raw.parse::<TokenDelivery>() {
                Ok(mode) => auth.token_delivery = mode,
                Err(e) => warn!(error = %e, "ignoring TOKEN_DELIVERY"),
            }
        }
        if let Ok(raw) = std::env::var("SECURE_COOKIE") {
            auth.secure_cookies = parse_flag(&raw);
        }
        if let Ok(code) = std::env::var("TWO_FACTOR_CODE")
            && !code.trim().is_empty()
        {
            auth.two_factor_code = code.trim().to_string();
        }

        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8000".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/oz".into()),
            auth,
        }
    }
}

/// `1`, `true`, `yes` and `on` (any case) are true; anything else is false.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
