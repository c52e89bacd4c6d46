//! Domain models shared by the auth and chat services.

pub mod auth;
pub mod chat;
