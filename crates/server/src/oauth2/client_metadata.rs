//! Client identifiers and client metadata documents.
//!
//! A client is identified by the HTTPS URL its metadata document is served
//! from. The rules here decide which URLs may serve as a client id and which
//! documents are acceptable.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;

/// Development-only client ids that resolve without network access.
const LOCALHOST_CLIENT_IDS: [&str; 2] = ["http://localhost", "http://localhost/"];
const LOCALHOST_REDIRECT_URI: &str = "http://127.0.0.1/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientIdError {
    #[error("invalid client ID: cannot be empty")]
    Empty,
    #[error("invalid client ID: invalid url")]
    InvalidUrl,
    #[error("invalid client ID: invalid url host")]
    InvalidHost,
    #[error("invalid client ID: must start with https://")]
    MissingHttps,
    #[error("invalid client ID: missing url path")]
    NoPath,
    #[error("invalid client ID: dot segments not allowed in path")]
    DotSegment,
    #[error("invalid client ID: fragment component not allowed")]
    Fragment,
    #[error("invalid client ID: query parameters not allowed")]
    Query,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedirectUriError {
    #[error("invalid redirect uri: cannot be empty")]
    Empty,
    #[error("invalid redirect uri: invalid uri")]
    InvalidUri,
    #[error("invalid redirect uri: invalid host")]
    InvalidHost,
    #[error("invalid redirect uri: dot segments not allowed in path")]
    DotSegment,
    #[error("invalid redirect uri: fragment component not allowed")]
    Fragment,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error(transparent)]
    ClientId(#[from] ClientIdError),
    #[error("no redirect uris provided")]
    NoRedirectUris,
    #[error(transparent)]
    RedirectUri(#[from] RedirectUriError),
    #[error("invalid {0}: only https is supported")]
    InsecureUri(&'static str),
    #[error("client id does not match url used to fetch it")]
    ClientIdMismatch,
}

/// A validated client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn parse(raw: &str, allow_localhost: bool) -> Result<Self, ClientIdError> {
        if raw.is_empty() {
            return Err(ClientIdError::Empty);
        }
        if allow_localhost && LOCALHOST_CLIENT_IDS.contains(&raw) {
            return Ok(Self(raw.to_string()));
        }

        let parsed = Url::parse(raw).map_err(|_| ClientIdError::InvalidUrl)?;
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(ClientIdError::InvalidHost);
        }
        if parsed.scheme() != "https" {
            return Err(ClientIdError::MissingHttps);
        }

        let path = raw_path(raw);
        if path.is_empty() || path == "/" {
            return Err(ClientIdError::NoPath);
        }
        if has_dot_segment(path) {
            return Err(ClientIdError::DotSegment);
        }
        if parsed.fragment().is_some() {
            return Err(ClientIdError::Fragment);
        }
        if parsed.query().is_some() {
            return Err(ClientIdError::Query);
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_localhost(&self) -> bool {
        LOCALHOST_CLIENT_IDS.contains(&self.0.as_str())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn validate_redirect_uri(raw: &str) -> Result<(), RedirectUriError> {
    if raw.is_empty() {
        return Err(RedirectUriError::Empty);
    }
    let parsed = Url::parse(raw).map_err(|_| RedirectUriError::InvalidUri)?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(RedirectUriError::InvalidHost);
    }
    if has_dot_segment(raw_path(raw)) {
        return Err(RedirectUriError::DotSegment);
    }
    if parsed.fragment().is_some() {
        return Err(RedirectUriError::Fragment);
    }
    Ok(())
}

/// The path exactly as written. `Url` resolves dot segments while parsing,
/// so they have to be looked for in the original string.
fn raw_path(raw: &str) -> &str {
    let after_scheme = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let end = after_scheme.find(['?', '#']).unwrap_or(after_scheme.len());
    let without_suffix = &after_scheme[..end];
    match without_suffix.find('/') {
        Some(start) => &without_suffix[start..],
        None => "",
    }
}

fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// A client metadata document as published by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClientMetadataDocument {
    pub client_id: String,
    pub redirect_uris: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,
}

impl ClientMetadataDocument {
    /// Checks the document in isolation and against the URL it was fetched
    /// from. The client id comparison is plain string equality.
    pub fn validate(&self, fetched_from: &ClientId) -> Result<(), MetadataError> {
        ClientId::parse(&self.client_id, false)?;

        if self.redirect_uris.is_empty() {
            return Err(MetadataError::NoRedirectUris);
        }
        for uri in &self.redirect_uris {
            validate_redirect_uri(uri)?;
        }

        for (field, value) in [
            ("logo_uri", &self.logo_uri),
            ("client_uri", &self.client_uri),
            ("tos_uri", &self.tos_uri),
            ("policy_uri", &self.policy_uri),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                let is_https = Url::parse(value).is_ok_and(|u| u.scheme() == "https");
                if !is_https {
                    return Err(MetadataError::InsecureUri(field));
                }
            }
        }

        if self.client_id != fetched_from.as_str() {
            return Err(MetadataError::ClientIdMismatch);
        }
        Ok(())
    }

    pub(crate) fn localhost(client_id: &ClientId) -> Self {
        Self {
            client_id: client_id.to_string(),
            redirect_uris: vec![LOCALHOST_REDIRECT_URI.to_string()],
            logo_uri: None,
            client_name: Some("Localhost".to_string()),
            client_uri: None,
            tos_uri: None,
            policy_uri: None,
        }
    }
}

/// A resolved client, as cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub document: ClientMetadataDocument,
    /// Path under which the prefetched logo is served, if one was cached.
    #[serde(default)]
    pub cached_logo: Option<String>,
}

impl ClientMetadata {
    /// Picks the redirect target for an authorization request.
    ///
    /// An explicit URI must be one of the registered ones. An empty one is
    /// only accepted when exactly one URI is registered.
    pub fn resolve_redirect_uri<'a>(&'a self, requested: &'a str) -> Option<&'a str> {
        if requested.is_empty() {
            return match self.document.redirect_uris.as_slice() {
                [only] => Some(only.as_str()),
                _ => None,
            };
        }
        self.document
            .redirect_uris
            .iter()
            .any(|registered| registered == requested)
            .then_some(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_rules() {
        let cases: [(&str, Result<(), ClientIdError>); 10] = [
            ("https://example.com/test", Ok(())),
            ("", Err(ClientIdError::Empty)),
            ("http://example.com/test", Err(ClientIdError::MissingHttps)),
            ("https://example.com/", Err(ClientIdError::NoPath)),
            ("https://example.com", Err(ClientIdError::NoPath)),
            (
                "https://example.com/hello/world/./goodbye",
                Err(ClientIdError::DotSegment),
            ),
            (
                "https://example.com/hello/world/../goodbye",
                Err(ClientIdError::DotSegment),
            ),
            (
                "https://example.com/hello/%2E%2E/goodbye",
                Err(ClientIdError::DotSegment),
            ),
            (
                "https://example.com/hello/world#goodbye",
                Err(ClientIdError::Fragment),
            ),
            (
                "https://example.com/hello/world?good=bye",
                Err(ClientIdError::Query),
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                ClientId::parse(raw, true).map(|_| ()),
                expected,
                "client id {raw:?}"
            );
        }
    }

    #[test]
    fn localhost_exception_is_opt_in() {
        assert!(ClientId::parse("http://localhost", true).unwrap().is_localhost());
        assert!(ClientId::parse("http://localhost/", true).is_ok());
        assert_eq!(
            ClientId::parse("http://localhost", false),
            Err(ClientIdError::MissingHttps)
        );
        assert_eq!(
            ClientId::parse("http://localhost:8080/", true),
            Err(ClientIdError::MissingHttps)
        );
    }

    #[test]
    fn redirect_uri_rules() {
        assert!(validate_redirect_uri("https://app.example/cb").is_ok());
        assert!(validate_redirect_uri("http://127.0.0.1/").is_ok());
        assert!(validate_redirect_uri("https://app.example/cb?x=1").is_ok());
        assert_eq!(validate_redirect_uri(""), Err(RedirectUriError::Empty));
        assert_eq!(
            validate_redirect_uri("not a uri"),
            Err(RedirectUriError::InvalidUri)
        );
        assert_eq!(
            validate_redirect_uri("https://app.example/a/../cb"),
            Err(RedirectUriError::DotSegment)
        );
        assert_eq!(
            validate_redirect_uri("https://app.example/cb#frag"),
            Err(RedirectUriError::Fragment)
        );
    }

    fn document(client_id: &str) -> ClientMetadataDocument {
        ClientMetadataDocument {
            client_id: client_id.to_string(),
            redirect_uris: vec!["https://app.example/cb".to_string()],
            logo_uri: None,
            client_name: Some("App".to_string()),
            client_uri: None,
            tos_uri: None,
            policy_uri: None,
        }
    }

    #[test]
    fn document_validation() {
        let id = ClientId::parse("https://app.example/client.json", false).unwrap();
        assert!(document(id.as_str()).validate(&id).is_ok());

        let mut no_redirects = document(id.as_str());
        no_redirects.redirect_uris.clear();
        assert_eq!(
            no_redirects.validate(&id),
            Err(MetadataError::NoRedirectUris)
        );

        let mut insecure_logo = document(id.as_str());
        insecure_logo.logo_uri = Some("http://app.example/logo.png".to_string());
        assert_eq!(
            insecure_logo.validate(&id),
            Err(MetadataError::InsecureUri("logo_uri"))
        );

        let mut insecure_tos = document(id.as_str());
        insecure_tos.tos_uri = Some("ftp://app.example/tos".to_string());
        assert_eq!(
            insecure_tos.validate(&id),
            Err(MetadataError::InsecureUri("tos_uri"))
        );

        // Trailing slash differs: no normalization before comparing.
        let other = ClientId::parse("https://app.example/client.json/", false).unwrap();
        assert_eq!(
            document(id.as_str()).validate(&other),
            Err(MetadataError::ClientIdMismatch)
        );
    }

    #[test]
    fn redirect_uri_selection() {
        let single = ClientMetadata {
            document: document("https://app.example/client.json"),
            cached_logo: None,
        };
        assert_eq!(single.resolve_redirect_uri(""), Some("https://app.example/cb"));
        assert_eq!(
            single.resolve_redirect_uri("https://app.example/cb"),
            Some("https://app.example/cb")
        );
        assert_eq!(single.resolve_redirect_uri("https://evil.example/cb"), None);

        let mut multi = single.clone();
        multi
            .document
            .redirect_uris
            .push("https://app.example/other".to_string());
        assert_eq!(multi.resolve_redirect_uri(""), None);
        assert_eq!(
            multi.resolve_redirect_uri("https://app.example/other"),
            Some("https://app.example/other")
        );
    }
}
