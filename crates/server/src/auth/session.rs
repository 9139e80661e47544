use crate::error::ApiError;
use crate::tokens::TokenStore;
use uuid::Uuid;

/// Resolves presented access tokens to the local user they belong to.
///
/// Backed by one token namespace; the session cookie authenticator and the
/// OAuth bearer authenticator are two instances of this.
#[derive(Clone)]
pub struct SessionAuthenticator {
    tokens: TokenStore,
}

impl SessionAuthenticator {
    pub fn new(tokens: TokenStore) -> Self {
        Self { tokens }
    }

    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, access_token: &str) -> Result<Uuid, ApiError> {
        if access_token.is_empty() {
            return Err(ApiError::Unauthenticated);
        }
        match self.tokens.get_access_token_data(access_token).await {
            Ok(Some(data)) => Ok(data.user_id),
            Ok(None) => Err(ApiError::Unauthenticated),
            Err(e) => Err(ApiError::internal(e)),
        }
    }
}
