//! Local account registration, login and session lifecycle.

use super::validation::{DisplayName, Email, Login, Password, Username};
use crate::credentials::{self, HashParams};
use crate::entity::user;
use crate::error::{ApiError, ConflictKind};
use crate::tokens::{TokenPair, TokenStore, TokenStoreError};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, SqlErr,
};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

const INCORRECT_CREDENTIALS: &str = "Incorrect credentials";

/// Unvalidated registration input.
#[derive(Debug, Default)]
pub struct RegisterParams {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    pub user: user::Model,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    sessions: TokenStore,
    hash_params: HashParams,
}

impl AccountService {
    pub fn new(db: Arc<DatabaseConnection>, sessions: TokenStore, hash_params: HashParams) -> Self {
        Self {
            db,
            sessions,
            hash_params,
        }
    }

    pub fn session_tokens(&self) -> &TokenStore {
        &self.sessions
    }

    /// Creates an account and signs it in.
    ///
    /// Without email and password the account is anonymous. Supplying only
    /// one of the two is rejected.
    #[tracing::instrument(skip(self, params), fields(username = ?params.username))]
    pub async fn register(&self, params: RegisterParams) -> Result<Session, ApiError> {
        let username = match params.username.as_deref() {
            Some(raw) => Username::parse(raw)?,
            None => Username::generate()?,
        };
        let display_name = match params.display_name.as_deref() {
            Some(raw) => DisplayName::parse(raw)?.into_inner(),
            None => username.as_str().to_string(),
        };

        let (email, password_hash) = match (params.email.as_deref(), params.password.as_deref()) {
            (None, None) => (None, None),
            (None, Some(_)) => return Err(ApiError::Validation("Email not provided".into())),
            (Some(_), None) => return Err(ApiError::Validation("Password not provided".into())),
            (Some(email), Some(password)) => {
                let email = Email::parse(email)?;
                let password = Password::parse(password)?;
                let hash = self.hash(password).await?;
                (Some(email.into_inner()), Some(hash))
            }
        };

        let id = Uuid::now_v7();
        let model = user::ActiveModel {
            id: Set(id.to_string()),
            username: Set(username.into_inner()),
            email: Set(email),
            password_hash: Set(password_hash),
            display_name: Set(display_name),
            created_at: Set(OffsetDateTime::now_utc()),
        };
        let user = model.insert(self.db.as_ref()).await.map_err(map_insert_error)?;
        tracing::info!(user_id = %id, anonymous = user.is_anonymous(), "registered user");

        let tokens = self.issue(id).await?;
        Ok(Session { user, tokens })
    }

    /// Signs in with a username or email and a password. Unknown users,
    /// accounts without a password and wrong passwords all look the same.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, login: &str, password: &str) -> Result<Session, ApiError> {
        if login.is_empty() {
            return Err(ApiError::Validation("Email or username not provided".into()));
        }
        if password.is_empty() {
            return Err(ApiError::Validation("Password not provided".into()));
        }

        let query = match Login::parse(login)? {
            Login::Username(username) => {
                user::Entity::find().filter(user::Column::Username.eq(username.as_str()))
            }
            Login::Email(email) => {
                user::Entity::find().filter(user::Column::Email.eq(email.into_inner()))
            }
        };
        let Some(user) = query.one(self.db.as_ref()).await? else {
            tracing::debug!("login for unknown user");
            return Err(ApiError::Unauthorized(INCORRECT_CREDENTIALS.into()));
        };
        let Some(stored_hash) = user.password_hash.clone() else {
            tracing::debug!(user_id = %user.id, "login for account without password");
            return Err(ApiError::Unauthorized(INCORRECT_CREDENTIALS.into()));
        };

        let candidate = password.to_string();
        let matched = tokio::task::spawn_blocking(move || {
            credentials::verify_password(&candidate, &stored_hash)
        })
        .await
        .map_err(ApiError::internal)?
        .map_err(|e| ApiError::Internal(format!("stored hash for user {}: {e}", user.id)))?;
        if !matched {
            tracing::debug!(user_id = %user.id, "login with wrong password");
            return Err(ApiError::Unauthorized(INCORRECT_CREDENTIALS.into()));
        }

        let id = Uuid::parse_str(&user.id).map_err(ApiError::internal)?;
        let tokens = self.issue(id).await?;
        Ok(Session { user, tokens })
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        self.sessions
            .refresh_token_pair(refresh_token)
            .await
            .map_err(|e| match e {
                TokenStoreError::RefreshTokenNotFound => ApiError::Unauthenticated,
                other => ApiError::internal(other),
            })
    }

    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let data = self
            .sessions
            .get_access_token_data(access_token)
            .await
            .map_err(ApiError::internal)?
            .ok_or(ApiError::Unauthenticated)?;
        self.sessions
            .delete_token_pair(access_token, &data.refresh_token)
            .await
            .map_err(ApiError::internal)
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<user::Model>, ApiError> {
        Ok(user::Entity::find_by_id(user_id.to_string())
            .one(self.db.as_ref())
            .await?)
    }

    async fn issue(&self, user_id: Uuid) -> Result<TokenPair, ApiError> {
        self.sessions
            .issue_token_pair(user_id)
            .await
            .map_err(ApiError::internal)
    }

    /// Hashes on the blocking pool.
    async fn hash(&self, password: Password) -> Result<String, ApiError> {
        let params = self.hash_params.clone();
        tokio::task::spawn_blocking(move || credentials::hash_password(password.as_str(), &params))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::internal)
    }
}

/// Maps unique constraint violations to conflicts by constraint name.
/// Postgres reports `users_username_key`, SQLite reports `users.username`.
fn map_insert_error(err: DbErr) -> ApiError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) => {
            let kind = if message.contains("users_username_key")
                || message.contains("users.username")
            {
                ConflictKind::Username
            } else if message.contains("users_email_key") || message.contains("users.email") {
                ConflictKind::Email
            } else {
                ConflictKind::Other
            };
            tracing::debug!(%message, ?kind, "registration conflict");
            ApiError::Conflict(kind)
        }
        _ => ApiError::internal(err),
    }
}
