//! Outbound HTTP for attacker-influenced URLs.
//!
//! Client metadata documents, client logos and federation well-known
//! documents are all addressed by URLs someone else chose. Everything that
//! dereferences such a URL goes through a [`DocumentFetcher`], whose
//! production implementation is [`SafeFetcher`].

mod policy;
mod safe;
mod tls;

pub use policy::is_public_ip;
pub use safe::SafeFetcher;
pub use tls::shared_tls_config;

use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    /// Responses with a larger body are rejected.
    pub max_body_bytes: usize,
    /// Refuse plain `http://` URLs.
    pub require_https: bool,
    pub accept: &'static str,
}

impl FetchRequest {
    /// A JSON document fetched over HTTPS.
    pub fn json(url: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            url: url.into(),
            max_body_bytes,
            require_https: true,
            accept: "application/json",
        }
    }

    /// An image fetched over HTTPS.
    pub fn image(url: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            url: url.into(),
            max_body_bytes,
            require_https: true,
            accept: "image/*",
        }
    }

    pub fn allow_http(mut self) -> Self {
        self.require_https = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetches `request.url`. Any non-2xx status is an error.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchedDocument, FetchError>;
}

pub type SharedFetcher = Arc<dyn DocumentFetcher>;
