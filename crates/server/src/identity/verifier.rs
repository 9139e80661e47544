use super::{GlobalUserAddress, IdentityClaims, WellKnownDocument, well_known_path};
use crate::fetch::{FetchRequest, SharedFetcher};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

/// Only the issuer is read from an unverified token.
#[derive(Debug, Deserialize)]
struct UnverifiedIssuer {
    iss: String,
}

/// Turns an issuer claim into an origin URL. A bare host gets `https://`.
/// Plain `http://` is only accepted when `allow_insecure` is set.
pub fn normalize_issuer(issuer: &str, allow_insecure: bool) -> Option<Url> {
    if issuer.is_empty() {
        return None;
    }
    let candidate = if issuer.contains("://") {
        issuer.to_string()
    } else {
        format!("https://{issuer}")
    };
    let url = Url::parse(&candidate).ok()?;
    match url.scheme() {
        "https" => {}
        "http" if allow_insecure => {}
        _ => return None,
    }
    if url.host_str().is_none_or(str::is_empty)
        || !url.username().is_empty()
        || url.password().is_some()
        || url.path() != "/"
        || url.query().is_some()
        || url.fragment().is_some()
    {
        return None;
    }
    Some(url)
}

fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Verifies identity tokens issued by other servers.
#[derive(Clone)]
pub struct FederationVerifier {
    fetcher: SharedFetcher,
    max_document_bytes: usize,
    allow_insecure_issuer: bool,
}

impl FederationVerifier {
    pub fn new(fetcher: SharedFetcher, max_document_bytes: usize) -> Self {
        Self {
            fetcher,
            max_document_bytes,
            allow_insecure_issuer: false,
        }
    }

    /// Accept `http://` issuers. Development and tests only.
    pub fn allow_insecure_issuer(mut self, allow: bool) -> Self {
        self.allow_insecure_issuer = allow;
        self
    }

    /// Resolves an `Authorization` header value to the caller's global
    /// address. Every failure is `None`; the reason is only logged.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, authorization: Option<&str>) -> Option<GlobalUserAddress> {
        let Some(token) = authorization.and_then(|h| h.strip_prefix("Bearer ")) else {
            tracing::debug!("missing bearer token");
            return None;
        };

        let hint = match unverified_issuer(token) {
            Ok(iss) => iss,
            Err(e) => {
                tracing::debug!(error = %e, "identity token could not be parsed");
                return None;
            }
        };
        let Some(origin) = normalize_issuer(&hint, self.allow_insecure_issuer) else {
            tracing::debug!(issuer = %hint, "identity token issuer is not a valid origin");
            return None;
        };

        let public_key = self.fetch_public_key(&origin).await?;
        let key = match DecodingKey::from_rsa_pem(public_key.as_bytes()) {
            Ok(key) => key,
            Err(e) => {
                tracing::info!(error = %e, issuer = %origin, "issuer published an unusable key");
                return None;
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;
        let claims = match decode::<IdentityClaims>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::info!(error = %e, issuer = %origin, "identity token failed verification");
                return None;
            }
        };

        // From here on only the verified claims count.
        let Some(verified_origin) = normalize_issuer(&claims.iss, self.allow_insecure_issuer)
        else {
            tracing::info!(issuer = %claims.iss, "verified issuer is not a valid origin");
            return None;
        };
        let user_id = match Uuid::parse_str(&claims.sub) {
            Ok(id) => id,
            Err(e) => {
                tracing::info!(error = %e, "identity token subject is not a user id");
                return None;
            }
        };

        Some(GlobalUserAddress {
            user_id,
            host: authority(&verified_origin)?,
        })
    }

    async fn fetch_public_key(&self, origin: &Url) -> Option<String> {
        let url = origin.join(&well_known_path()).ok()?;
        let mut request = FetchRequest::json(url.as_str(), self.max_document_bytes);
        if self.allow_insecure_issuer {
            request = request.allow_http();
        }
        let fetched = match self.fetcher.fetch(request).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::info!(error = %e, %url, "failed to fetch issuer well-known document");
                return None;
            }
        };
        match serde_json::from_slice::<WellKnownDocument>(&fetched.body) {
            Ok(doc) => Some(doc.public_key),
            Err(e) => {
                tracing::info!(error = %e, %url, "issuer well-known document is invalid");
                None
            }
        }
    }
}

fn unverified_issuer(token: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = decode::<UnverifiedIssuer>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims.iss)
}
