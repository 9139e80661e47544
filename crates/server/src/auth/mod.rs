//! Local accounts and the authenticators built on top of them.

pub mod cookies;
pub mod endpoints;
pub mod extract;
pub mod service;
pub mod session;
pub mod validation;

pub use extract::{ApiUser, FederatedUser, SessionUser};
pub use service::{AccountService, RegisterParams, Session};
pub use session::SessionAuthenticator;

/// OpenAPI tag for session endpoints.
pub const AUTH_TAG: &str = "Auth";
