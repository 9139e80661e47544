//! OAuth2 authorization server.
//!
//! Clients are not registered ahead of time. A client's identifier is the
//! HTTPS URL of a JSON metadata document listing its redirect URIs, which is
//! fetched (through the safe fetcher) and cached on first use.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/oauth/authorize` - Consent prompt for a pending grant
//! - `POST /api/v1/oauth/authorize` - Issue a code and redirect to the client
//! - `POST /api/v1/oauth/token` - Authorization code and refresh token grants
//! - `GET /api/v1/oauth/logo/{id}` - Cached client logos

pub mod client_metadata;
pub mod codes;
pub mod endpoints;
pub mod logo;
pub mod resolver;

pub use client_metadata::{ClientId, ClientMetadata, ClientMetadataDocument};
pub use codes::{CodeStore, CodeStoreError, StoredCode};
pub use endpoints::router;
pub use logo::LogoStore;
pub use resolver::{ClientMetadataResolver, ResolveError};

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
