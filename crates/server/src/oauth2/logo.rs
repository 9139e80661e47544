//! Prefetched client logos.
//!
//! Logos are fetched once when client metadata is resolved and then served
//! from our own cache, so rendering a consent page never makes the user's
//! browser talk to the client's server.

use crate::error::{FetchError, KvError};
use crate::fetch::{FetchRequest, SharedFetcher};
use crate::store::{SharedStore, get_json, set_json};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

/// Route prefix under which cached logos are served.
pub const LOGO_ROUTE_PREFIX: &str = "/api/v1/oauth/logo";

/// Logos are served from our origin, so only formats that cannot carry
/// script are cached.
const RASTER_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Media type without parameters, lowercased, if it is an allowed raster
/// format.
fn raster_media_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    RASTER_IMAGE_TYPES.iter().copied().find(|t| *t == essence)
}

#[derive(Debug, Error)]
pub enum LogoError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Logo has unsupported content type {0:?}")]
    NotAnImage(Option<String>),
    #[error(transparent)]
    Kv(#[from] KvError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedLogo {
    pub content_type: String,
    data: String,
}

impl CachedLogo {
    pub fn bytes(&self) -> Result<Vec<u8>, KvError> {
        STANDARD
            .decode(&self.data)
            .map_err(|e| KvError::Backend(format!("corrupt cached logo: {e}")))
    }
}

#[derive(Clone)]
pub struct LogoStore {
    kv: SharedStore,
    fetcher: SharedFetcher,
    max_bytes: usize,
}

impl LogoStore {
    pub fn new(kv: SharedStore, fetcher: SharedFetcher, max_bytes: usize) -> Self {
        Self {
            kv,
            fetcher,
            max_bytes,
        }
    }

    fn cache_key(id: &str) -> String {
        format!("clientlogo:{id}")
    }

    /// Fetches `logo_uri` and caches it for `ttl`. Returns the path the logo
    /// is served from.
    #[tracing::instrument(skip(self))]
    pub async fn store(&self, logo_uri: &str, ttl: Duration) -> Result<String, LogoError> {
        let fetched = self
            .fetcher
            .fetch(FetchRequest::image(logo_uri, self.max_bytes))
            .await?;
        let content_type = fetched
            .content_type
            .as_deref()
            .and_then(raster_media_type)
            .ok_or_else(|| LogoError::NotAnImage(fetched.content_type.clone()))?
            .to_string();

        let id = hex::encode(Sha256::digest(logo_uri.as_bytes()));
        let cached = CachedLogo {
            content_type,
            data: STANDARD.encode(&fetched.body),
        };
        set_json(self.kv.as_ref(), &Self::cache_key(&id), &cached, ttl).await?;
        Ok(format!("{LOGO_ROUTE_PREFIX}/{id}"))
    }

    pub async fn get(&self, id: &str) -> Result<Option<CachedLogo>, KvError> {
        get_json(self.kv.as_ref(), &Self::cache_key(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_raster_types_are_accepted() {
        assert_eq!(raster_media_type("image/png"), Some("image/png"));
        assert_eq!(raster_media_type("Image/JPEG; charset=binary"), Some("image/jpeg"));
        assert_eq!(raster_media_type("image/svg+xml"), None);
        assert_eq!(raster_media_type("text/html"), None);
        assert_eq!(raster_media_type(""), None);
    }
}
