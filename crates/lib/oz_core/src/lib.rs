//! # oz_core
//!
//! Core domain logic for Oz: identities, login and token lifecycle, chat
//! sessions and their real-time relay.

pub mod auth;
pub mod chat;
pub mod migrate;
pub mod models;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
