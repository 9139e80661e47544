//! Axum extractors for the three ways a caller can be authenticated.
//!
//! - [`SessionUser`]: first-party `accessToken` cookie, session namespace.
//! - [`ApiUser`]: `Authorization: Bearer`, OAuth namespace.
//! - [`FederatedUser`]: `Authorization: Bearer` identity token signed by
//!   another server.

use super::cookies::ACCESS_TOKEN_COOKIE;
use crate::AppResources;
use crate::error::ApiError;
use crate::identity::GlobalUserAddress;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

fn resources(parts: &Parts) -> Result<AppResources, ApiError> {
    parts.extensions.get::<AppResources>().cloned().ok_or_else(|| {
        tracing::error!("AppResources not found in extensions");
        ApiError::Internal("missing application resources".to_string())
    })
}

fn authorization(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

fn bearer(parts: &Parts) -> Option<&str> {
    authorization(parts).and_then(|h| h.strip_prefix("Bearer "))
}

/// A local user signed in through the session cookie.
#[derive(Debug, Clone, Copy)]
pub struct SessionUser(pub Uuid);

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(ApiError::Unauthenticated)?;
        let user_id = resources.sessions.authenticate(&token).await?;
        Ok(SessionUser(user_id))
    }
}

/// A local user acting through a third-party OAuth client.
#[derive(Debug, Clone, Copy)]
pub struct ApiUser(pub Uuid);

impl<S> FromRequestParts<S> for ApiUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        let token = bearer(parts).ok_or(ApiError::Unauthenticated)?;
        let user_id = resources.oauth_sessions.authenticate(token).await?;
        Ok(ApiUser(user_id))
    }
}

/// A user of another server, vouched for by that server's identity token.
#[derive(Debug, Clone)]
pub struct FederatedUser(pub GlobalUserAddress);

impl<S> FromRequestParts<S> for FederatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        resources
            .federation
            .authenticate(authorization(parts))
            .await
            .map(FederatedUser)
            .ok_or(ApiError::Unauthenticated)
    }
}
