//! Trust core for a federated chat homeserver.
//!
//! Local accounts with cookie sessions, an OAuth2 authorization server whose
//! clients are identified by metadata document URLs, and short-lived signed
//! identity tokens that let users of one server prove who they are to
//! another. Every outbound request to an untrusted URL goes through
//! [`fetch::SafeFetcher`].

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::auth::{AccountService, SessionAuthenticator};
use crate::config::AppConfig;
use crate::fetch::SharedFetcher;
use crate::identity::{FederationVerifier, IdentityError, IdentitySigner};
use crate::oauth2::{ClientMetadataResolver, CodeStore, LogoStore};
use crate::store::SharedStore;
use crate::tokens::{TokenNamespace, TokenStore};

pub mod api;
pub mod auth;
pub mod config;
pub mod credentials;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod messages;
pub mod oauth2;
pub mod store;
pub mod tokens;
pub mod validation;

/// Everything a request handler can reach, shared through an axum
/// `Extension`.
#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub kv: SharedStore,
    pub accounts: AccountService,
    /// Resolves session cookies.
    pub sessions: SessionAuthenticator,
    /// Tokens handed to OAuth clients.
    pub oauth_tokens: TokenStore,
    /// Resolves OAuth bearer tokens.
    pub oauth_sessions: SessionAuthenticator,
    pub codes: CodeStore,
    pub client_metadata: ClientMetadataResolver,
    pub logos: LogoStore,
    pub signer: IdentitySigner,
    pub federation: FederationVerifier,
}

impl AppResources {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        kv: SharedStore,
        fetcher: SharedFetcher,
    ) -> Result<Self, IdentityError> {
        let tokens = &config.tokens;
        let session_tokens = TokenStore::new(
            kv.clone(),
            TokenNamespace::Session,
            tokens.access_ttl(),
            tokens.refresh_ttl(),
        );
        let oauth_tokens = TokenStore::new(
            kv.clone(),
            TokenNamespace::OAuth,
            tokens.access_ttl(),
            tokens.refresh_ttl(),
        );

        let fetch = &config.fetcher;
        let logos = LogoStore::new(kv.clone(), fetcher.clone(), fetch.logo_max_bytes);
        let client_metadata = ClientMetadataResolver::new(
            kv.clone(),
            fetcher.clone(),
            logos.clone(),
            fetch.metadata_max_bytes,
            config.oauth2.logo_cache_policy,
        );

        let signer = IdentitySigner::from_pem(
            &config.identity.private_key_pem,
            &config.identity.public_key_pem,
        )?;
        let federation = FederationVerifier::new(fetcher, fetch.metadata_max_bytes)
            .allow_insecure_issuer(fetch.allow_private_networks);

        Ok(Self {
            accounts: AccountService::new(
                db.clone(),
                session_tokens.clone(),
                config.credentials.clone(),
            ),
            sessions: SessionAuthenticator::new(session_tokens),
            oauth_sessions: SessionAuthenticator::new(oauth_tokens.clone()),
            oauth_tokens,
            codes: CodeStore::new(kv.clone(), config.oauth2.code_ttl()),
            client_metadata,
            logos,
            signer,
            federation,
            db,
            config,
            kv,
        })
    }
}
