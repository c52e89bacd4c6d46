//! Authentication and session lifecycle.
//!
//! [`AuthService`] owns the login gate, token issuance/rotation/revocation,
//! per-request identity resolution and account operations. It talks to
//! storage only through [`AuthStore`] and receives its secret, TTLs and
//! policy through an injected [`AuthConfig`].

pub mod account;
pub mod config;
pub mod jwt;
pub mod login;
pub mod password;
pub mod resolver;
pub mod tokens;
pub mod two_factor;

use std::sync::Arc;

use thiserror::Error;

use crate::store::{AuthStore, StoreError};

pub use config::{AuthConfig, TokenDelivery};
pub use login::LoginOutcome;
pub use tokens::IssuedTokens;
pub use two_factor::{StaticCodeVerifier, TwoFactorVerifier};

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Account locked, retry in {remaining_secs}s")]
    LockedOut { remaining_secs: i64 },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Two-factor code required")]
    TwoFactorRequired,

    #[error("Invalid two-factor code")]
    TwoFactorInvalid,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Authentication service. Cheap to clone.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    config: Arc<AuthConfig>,
    two_factor: Arc<dyn TwoFactorVerifier>,
}

impl AuthService {
    /// Build a service whose two-factor check accepts `config.two_factor_code`.
    pub fn new(store: Arc<dyn AuthStore>, config: AuthConfig) -> Self {
        let two_factor = Arc::new(StaticCodeVerifier::new(config.two_factor_code.clone()));
        Self {
            store,
            config: Arc::new(config),
            two_factor,
        }
    }

    /// Replace the two-factor verifier.
    pub fn with_two_factor(mut self, verifier: Arc<dyn TwoFactorVerifier>) -> Self {
        self.two_factor = verifier;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn secret(&self) -> &[u8] {
        self.config.jwt_secret.as_bytes()
    }
}
