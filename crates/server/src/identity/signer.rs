use super::{IdentityClaims, WellKnownDocument};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

const TOKEN_LIFETIME: Duration = Duration::minutes(15);

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid identity key: {0}")]
    Key(String),
    #[error("Failed to sign identity token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

/// Signs identity tokens with this server's private key.
#[derive(Clone)]
pub struct IdentitySigner {
    encoding_key: EncodingKey,
    public_key_pem: String,
}

impl IdentitySigner {
    pub fn from_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self, IdentityError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| IdentityError::Key(e.to_string()))?;
        // Reject a bad public key at startup rather than on the first
        // remote verification.
        jsonwebtoken::DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| IdentityError::Key(e.to_string()))?;
        Ok(Self {
            encoding_key,
            public_key_pem: public_key_pem.to_string(),
        })
    }

    /// A token asserting that `user_id` is a user of `host`, valid for
    /// fifteen minutes.
    #[tracing::instrument(skip(self))]
    pub fn sign(&self, host: &str, user_id: Uuid) -> Result<String, IdentityError> {
        let claims = IdentityClaims {
            iss: host.to_string(),
            sub: user_id.to_string(),
            exp: (OffsetDateTime::now_utc() + TOKEN_LIFETIME).unix_timestamp(),
        };
        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    pub fn well_known(&self) -> WellKnownDocument {
        WellKnownDocument {
            public_key: self.public_key_pem.clone(),
        }
    }
}
