//! Opaque access/refresh token pairs.
//!
//! Each half of a pair is its own cache record pointing at its sibling, so
//! either token is enough to revoke both. Rotation always mints new values;
//! records are never updated in place.

use crate::error::KvError;
use crate::store::{SharedStore, get_json, set_json};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const ACCESS_TOKEN_BYTES: usize = 32;
const REFRESH_TOKEN_BYTES: usize = 64;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("Refresh token not found")]
    RefreshTokenNotFound,
    #[error("Random source failure: {0}")]
    Random(String),
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Separates first-party session tokens from tokens handed to third-party
/// OAuth clients. A token is only ever resolved in its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenNamespace {
    Session,
    OAuth,
}

impl TokenNamespace {
    fn prefix(self) -> &'static str {
        match self {
            TokenNamespace::Session => "session",
            TokenNamespace::OAuth => "oauth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenData {
    pub user_id: Uuid,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RefreshTokenData {
    user_id: Uuid,
    access_token: String,
}

#[derive(Clone)]
pub struct TokenStore {
    kv: SharedStore,
    namespace: TokenNamespace,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenStore {
    pub fn new(
        kv: SharedStore,
        namespace: TokenNamespace,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            kv,
            namespace,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn access_key(&self, token: &str) -> String {
        format!("{}:access:{token}", self.namespace.prefix())
    }

    fn refresh_key(&self, token: &str) -> String {
        format!("{}:refresh:{token}", self.namespace.prefix())
    }

    /// Mints a fresh pair for `user_id`.
    ///
    /// Two independent writes. If the second fails the first is removed on a
    /// best-effort basis; anything left behind expires with its TTL.
    #[tracing::instrument(skip(self), fields(namespace = ?self.namespace))]
    pub async fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenStoreError> {
        let pair = TokenPair {
            access_token: random_token(ACCESS_TOKEN_BYTES)?,
            refresh_token: random_token(REFRESH_TOKEN_BYTES)?,
        };

        let access_key = self.access_key(&pair.access_token);
        set_json(
            self.kv.as_ref(),
            &access_key,
            &AccessTokenData {
                user_id,
                refresh_token: pair.refresh_token.clone(),
            },
            self.access_ttl,
        )
        .await?;

        let refresh_written = set_json(
            self.kv.as_ref(),
            &self.refresh_key(&pair.refresh_token),
            &RefreshTokenData {
                user_id,
                access_token: pair.access_token.clone(),
            },
            self.refresh_ttl,
        )
        .await;

        if let Err(e) = refresh_written {
            if let Err(cleanup) = self.kv.delete(&access_key).await {
                tracing::warn!(error = %cleanup, "failed to remove half-issued access token");
            }
            return Err(e.into());
        }

        Ok(pair)
    }

    #[tracing::instrument(skip_all, fields(namespace = ?self.namespace))]
    pub async fn get_access_token_data(
        &self,
        access_token: &str,
    ) -> Result<Option<AccessTokenData>, TokenStoreError> {
        Ok(get_json(self.kv.as_ref(), &self.access_key(access_token)).await?)
    }

    /// Exchanges a refresh token for a brand-new pair and revokes the old one.
    ///
    /// When two callers race on the same refresh token only the one that
    /// actually removes the old refresh record keeps its new pair.
    #[tracing::instrument(skip_all, fields(namespace = ?self.namespace))]
    pub async fn refresh_token_pair(
        &self,
        refresh_token: &str,
    ) -> Result<TokenPair, TokenStoreError> {
        let refresh_key = self.refresh_key(refresh_token);
        let old: RefreshTokenData = get_json(self.kv.as_ref(), &refresh_key)
            .await?
            .ok_or(TokenStoreError::RefreshTokenNotFound)?;

        let pair = self.issue_token_pair(old.user_id).await?;

        match self.kv.delete(&self.access_key(&old.access_token)).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("old access token already expired"),
            Err(e) => tracing::warn!(error = %e, "failed to delete old access token"),
        }

        let removed = match self.kv.delete(&refresh_key).await {
            Ok(removed) => removed,
            Err(e) => {
                self.revoke_quietly(&pair).await;
                return Err(e.into());
            }
        };
        if !removed {
            tracing::warn!(user_id = %old.user_id, "refresh token rotated concurrently");
            self.revoke_quietly(&pair).await;
            return Err(TokenStoreError::RefreshTokenNotFound);
        }

        Ok(pair)
    }

    /// Revokes both halves of a pair. Missing records are not an error.
    #[tracing::instrument(skip_all, fields(namespace = ?self.namespace))]
    pub async fn delete_token_pair(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), TokenStoreError> {
        self.kv.delete(&self.access_key(access_token)).await?;
        self.kv.delete(&self.refresh_key(refresh_token)).await?;
        Ok(())
    }

    async fn revoke_quietly(&self, pair: &TokenPair) {
        if let Err(e) = self
            .delete_token_pair(&pair.access_token, &pair.refresh_token)
            .await
        {
            tracing::warn!(error = %e, "failed to revoke discarded token pair");
        }
    }
}

fn random_token(len: usize) -> Result<String, TokenStoreError> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).map_err(|e| TokenStoreError::Random(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}
