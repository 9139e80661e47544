//! Cross-server identity.
//!
//! A server vouches for its users to other servers with short-lived RS256
//! tokens. The receiving server discovers the issuer's public key from the
//! issuer's well-known document and derives a [`GlobalUserAddress`].

pub mod endpoints;
mod signer;
mod verifier;

pub use signer::{IdentityError, IdentitySigner};
pub use verifier::{FederationVerifier, normalize_issuer};

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Service name used in the well-known path.
pub const SERVICE_NAME: &str = "chat";

/// OpenAPI tag for identity endpoints.
pub const IDENTITY_TAG: &str = "Identity";

pub fn well_known_path() -> String {
    format!("/.well-known/{SERVICE_NAME}.json")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub iss: String,
    pub sub: String,
    pub exp: i64,
}

/// Document every server publishes so others can verify its tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WellKnownDocument {
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

/// A user as seen from any server: local id plus the server that vouches
/// for it. Two servers may hand out the same local id, so the pair is the
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalUserAddress {
    pub user_id: Uuid,
    pub host: String,
}

impl fmt::Display for GlobalUserAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.host)
    }
}
