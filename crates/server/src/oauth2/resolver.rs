//! Resolution of client metadata documents.

use super::client_metadata::{ClientId, ClientMetadata, ClientMetadataDocument};
use super::logo::LogoStore;
use crate::config::LogoCachePolicy;
use crate::error::ApiError;
use crate::fetch::{FetchRequest, SharedFetcher};
use crate::store::{SharedStore, get_json, set_json};
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The client id does not lead to an acceptable metadata document. The
    /// reason is logged, never returned.
    #[error("client id is not a valid accessible url to a client metadata document")]
    BadRequest,
    #[error("Client metadata cache failure: {0}")]
    Cache(String),
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::BadRequest => ApiError::NotAccessible,
            ResolveError::Cache(detail) => ApiError::Internal(detail),
        }
    }
}

#[derive(Clone)]
pub struct ClientMetadataResolver {
    kv: SharedStore,
    fetcher: SharedFetcher,
    logos: LogoStore,
    max_document_bytes: usize,
    logo_policy: LogoCachePolicy,
}

impl ClientMetadataResolver {
    pub fn new(
        kv: SharedStore,
        fetcher: SharedFetcher,
        logos: LogoStore,
        max_document_bytes: usize,
        logo_policy: LogoCachePolicy,
    ) -> Self {
        Self {
            kv,
            fetcher,
            logos,
            max_document_bytes,
            logo_policy,
        }
    }

    fn cache_key(client_id: &ClientId) -> String {
        format!(
            "clientmetadata:{}",
            hex::encode(Sha256::digest(client_id.as_str().as_bytes()))
        )
    }

    #[tracing::instrument(skip(self), fields(client_id = %client_id))]
    pub async fn resolve(
        &self,
        client_id: &ClientId,
        cache_ttl: Duration,
    ) -> Result<ClientMetadata, ResolveError> {
        if client_id.is_localhost() {
            return Ok(ClientMetadata {
                document: ClientMetadataDocument::localhost(client_id),
                cached_logo: None,
            });
        }

        let key = Self::cache_key(client_id);
        if let Some(cached) = get_json::<ClientMetadata>(self.kv.as_ref(), &key)
            .await
            .map_err(|e| ResolveError::Cache(e.to_string()))?
        {
            tracing::debug!("client metadata cache hit");
            return Ok(cached);
        }
        tracing::debug!("client metadata cache miss");

        let fetched = self
            .fetcher
            .fetch(FetchRequest::json(client_id.as_str(), self.max_document_bytes))
            .await
            .map_err(|e| {
                tracing::info!(error = %e, "client metadata fetch failed");
                ResolveError::BadRequest
            })?;

        let document: ClientMetadataDocument =
            serde_json::from_slice(&fetched.body).map_err(|e| {
                tracing::info!(error = %e, "client metadata document is not valid JSON");
                ResolveError::BadRequest
            })?;

        document.validate(client_id).map_err(|e| {
            tracing::info!(error = %e, "client metadata document rejected");
            ResolveError::BadRequest
        })?;

        let cached_logo = match document.logo_uri.as_deref().filter(|u| !u.is_empty()) {
            Some(logo_uri) => match self.logos.store(logo_uri, cache_ttl).await {
                Ok(path) => Some(path),
                Err(e) => match self.logo_policy {
                    LogoCachePolicy::BestEffort => {
                        tracing::warn!(error = %e, "failed to cache client logo, continuing without it");
                        None
                    }
                    LogoCachePolicy::Required => {
                        tracing::info!(error = %e, "failed to cache client logo");
                        return Err(ResolveError::BadRequest);
                    }
                },
            },
            None => None,
        };

        let metadata = ClientMetadata {
            document,
            cached_logo,
        };

        // A failed write is fatal: otherwise a client could make us refetch
        // its document on every request.
        set_json(self.kv.as_ref(), &key, &metadata, cache_ttl)
            .await
            .map_err(|e| ResolveError::Cache(e.to_string()))?;

        Ok(metadata)
    }
}
