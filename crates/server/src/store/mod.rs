//! Key-value cache with server-side expiry.
//!
//! Tokens, authorization codes, client metadata and client logos all live
//! here. Every operation touches a single key, so backends only need
//! single-key atomicity.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::error::KvError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Writes `value`, replacing any existing entry. The entry is gone once
    /// `ttl` has elapsed.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError>;

    /// Removes `key`. Returns whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Atomically reads and removes `key`. Of several concurrent callers at
    /// most one observes the value.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// The part of a key before its final `:` segment. Keys end in secrets
/// (tokens, codes), so only this prefix may be logged.
pub(crate) fn key_namespace(key: &str) -> &str {
    key.rsplit_once(':').map_or("", |(ns, _)| ns)
}

/// Connects to Redis when a URL is configured, otherwise falls back to the
/// in-process store.
pub async fn connect(redis_url: Option<&str>) -> Result<SharedStore, KvError> {
    match redis_url {
        Some(url) => {
            let store = RedisStore::connect(url).await?;
            tracing::info!("using redis cache backend");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("no redis_url configured, using in-process cache backend");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, KvError> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), KvError> {
    let raw = serde_json::to_vec(value)?;
    store.set(key, &raw, ttl).await
}
