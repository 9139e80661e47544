//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use chat_trust_core::{
    AppResources,
    config::{
        AppConfig, CookieConfig, FetcherConfig, IdentityConfig, OAuth2Config, TokenConfig,
    },
    credentials::HashParams,
    error::FetchError,
    fetch::{DocumentFetcher, FetchRequest, FetchedDocument, SharedFetcher},
    store::{MemoryStore, SharedStore},
};
use dashmap::DashMap;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const SERVER_A_PRIVATE: &str = include_str!("../fixtures/server_a_private.pem");
pub const SERVER_A_PUBLIC: &str = include_str!("../fixtures/server_a_public.pem");
pub const SERVER_B_PRIVATE: &str = include_str!("../fixtures/server_b_private.pem");
pub const SERVER_B_PUBLIC: &str = include_str!("../fixtures/server_b_public.pem");

pub const HOME_HOST: &str = "home.example.org";

/// Serves canned documents by exact URL. Enforces the scheme and size limits
/// of each request the same way the real fetcher does.
#[derive(Default)]
pub struct StaticFetcher {
    documents: DashMap<String, FetchedDocument>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, url: &str, content_type: &str, body: impl Into<Bytes>) {
        self.documents.insert(
            url.to_string(),
            FetchedDocument {
                content_type: Some(content_type.to_string()),
                body: body.into(),
            },
        );
    }

    pub fn insert_json(&self, url: &str, value: &impl Serialize) {
        let body = serde_json::to_vec(value).expect("serialize fixture");
        self.insert(url, "application/json", body);
    }

    pub fn remove(&self, url: &str) {
        self.documents.remove(url);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentFetcher for StaticFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchedDocument, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if request.require_https && !request.url.starts_with("https://") {
            return Err(FetchError::SchemeNotAllowed("http".into()));
        }
        let doc = self
            .documents
            .get(&request.url)
            .map(|d| d.clone())
            .ok_or(FetchError::Status(StatusCode::NOT_FOUND))?;
        if doc.body.len() > request.max_body_bytes {
            return Err(FetchError::BodyTooLarge(request.max_body_bytes));
        }
        Ok(doc)
    }
}

/// In-memory SQLite with the credential store schema.
pub async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE users (
            id TEXT PRIMARY KEY NOT NULL,
            username TEXT NOT NULL UNIQUE,
            email TEXT NULL UNIQUE,
            password_hash TEXT NULL,
            display_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create users table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE user_servers (
            user_id TEXT NOT NULL REFERENCES users(id),
            host TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, host)
        );"#,
    ))
    .await
    .expect("create user_servers table");

    db
}

/// Argon2 parameters cheap enough for tests.
pub fn cheap_hash_params() -> HashParams {
    HashParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
        salt_length: 16,
        output_length: 32,
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        redis_url: None,
        host: HOME_HOST.into(),
        listen_addr: "127.0.0.1:0".into(),
        identity: IdentityConfig {
            public_key_pem: SERVER_A_PUBLIC.into(),
            private_key_pem: SERVER_A_PRIVATE.into(),
        },
        tokens: TokenConfig::default(),
        oauth2: OAuth2Config::default(),
        fetcher: FetcherConfig::default(),
        credentials: cheap_hash_params(),
        cookies: CookieConfig { secure: false },
    }
}

pub struct TestApp {
    pub resources: AppResources,
    pub fetcher: Arc<StaticFetcher>,
    pub kv: SharedStore,
}

pub async fn test_app_with(config: AppConfig) -> TestApp {
    let fetcher = StaticFetcher::new();
    let kv: SharedStore = Arc::new(MemoryStore::new());
    let shared: SharedFetcher = fetcher.clone();
    let resources = AppResources::new(
        Arc::new(config),
        Arc::new(test_db().await),
        kv.clone(),
        shared,
    )
    .expect("build resources");
    TestApp {
        resources,
        fetcher,
        kv,
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(test_config()).await
}

pub const CLIENT_ID: &str = "https://app.example.com/oauth/client.json";
pub const CLIENT_REDIRECT: &str = "https://app.example.com/oauth/callback";

pub fn client_document(redirect_uris: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "client_id": CLIENT_ID,
        "client_name": "Example App",
        "redirect_uris": redirect_uris,
    })
}
