//! Single-use authorization codes.

use crate::error::KvError;
use crate::store::{SharedStore, set_json};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const CODE_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum CodeStoreError {
    #[error("Authorization code not found")]
    NotFound,
    #[error("Random source failure: {0}")]
    Random(String),
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// What a code was bound to when it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCode {
    pub code: String,
    pub user_id: Uuid,
    pub client_id: String,
    /// The `redirect_uri` parameter exactly as given at authorize time,
    /// possibly empty.
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct CodeStore {
    kv: SharedStore,
    ttl: Duration,
}

impl CodeStore {
    pub fn new(kv: SharedStore, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    fn key(code: &str) -> String {
        format!("oauthcode:{code}")
    }

    #[tracing::instrument(skip(self))]
    pub async fn insert_code(
        &self,
        user_id: Uuid,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<String, CodeStoreError> {
        let mut bytes = [0u8; CODE_BYTES];
        getrandom::fill(&mut bytes).map_err(|e| CodeStoreError::Random(e.to_string()))?;
        let code = URL_SAFE_NO_PAD.encode(bytes);

        let stored = StoredCode {
            code: code.clone(),
            user_id,
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
        };
        set_json(self.kv.as_ref(), &Self::key(&code), &stored, self.ttl).await?;
        Ok(code)
    }

    /// Removes the code and returns what it was bound to. The code is gone
    /// after this call whatever the caller does with the result.
    #[tracing::instrument(skip_all)]
    pub async fn delete_code(&self, code: &str) -> Result<StoredCode, CodeStoreError> {
        let raw = self
            .kv
            .take(&Self::key(code))
            .await?
            .ok_or(CodeStoreError::NotFound)?;
        let stored = serde_json::from_slice(&raw).map_err(KvError::from)?;
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn code_round_trip_is_single_use() {
        let codes = CodeStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(300));
        let user = Uuid::now_v7();
        let code = codes
            .insert_code(user, "https://app.example/client.json", "")
            .await
            .unwrap();
        assert!(!code.contains('='));

        let stored = codes.delete_code(&code).await.unwrap();
        assert_eq!(stored.user_id, user);
        assert_eq!(stored.client_id, "https://app.example/client.json");
        assert_eq!(stored.redirect_uri, "");

        assert!(matches!(
            codes.delete_code(&code).await,
            Err(CodeStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn expired_code_is_not_found() {
        let codes = CodeStore::new(Arc::new(MemoryStore::new()), Duration::from_millis(10));
        let code = codes
            .insert_code(Uuid::now_v7(), "https://a.example/c", "https://a.example/cb")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(matches!(
            codes.delete_code(&code).await,
            Err(CodeStoreError::NotFound)
        ));
    }
}
