//! Database entities for the credential store.

pub mod user;
pub mod user_server;
