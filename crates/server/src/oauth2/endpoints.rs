//! OAuth2 HTTP endpoints.
//!
//! Clients are identified by the URL of their metadata document; there is no
//! registration step. Only the authorization code grant and refresh token
//! rotation are supported.

use super::OAUTH2_TAG;
use super::client_metadata::{ClientId, ClientMetadata};
use super::codes::CodeStoreError;
use crate::AppResources;
use crate::auth::SessionUser;
use crate::credentials::constant_time_eq;
use crate::error::{ApiError, ErrorResponse};
use crate::tokens::{TokenPair, TokenStoreError};
use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, RawQuery},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::{Url, form_urlencoded};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize, authorize_submit))
        .routes(routes!(token))
        .routes(routes!(logo))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Parameters from the query string and, for POST requests, the form body.
/// Query parameters win when both carry the same name.
fn collect_params(query: Option<&str>, body: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(body)
        .chain(form_urlencoded::parse(query.unwrap_or_default().as_bytes()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// OAuth2 authorization request parameters.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Must be "code"
    pub response_type: String,
    /// URL of the client's metadata document
    pub client_id: String,
    /// Opaque value returned unchanged in the redirect
    pub state: String,
    /// Optional when the client registers exactly one redirect URI
    pub redirect_uri: String,
}

impl AuthorizeRequest {
    fn from_params(mut params: HashMap<String, String>) -> Self {
        let mut take = |name: &str| params.remove(name).unwrap_or_default();
        Self {
            response_type: take("response_type"),
            client_id: take("client_id"),
            state: take("state"),
            redirect_uri: take("redirect_uri"),
        }
    }
}

/// A validated authorization request.
struct AuthorizeForm {
    client_id: ClientId,
    state: String,
    /// Where the user agent is sent.
    redirect_uri: String,
    /// The `redirect_uri` parameter as given. Codes are bound to this, not to
    /// the substituted value.
    redirect_uri_param: String,
    metadata: ClientMetadata,
}

/// What the user is asked to approve.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConsentResponse {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Path of the cached client logo on this server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tos_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_uri: Option<String>,
    pub redirect_uri: String,
    pub state: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds
    pub access_token_expires_in: u64,
    /// Seconds
    pub refresh_token_expires_in: u64,
    pub token_type: String,
    pub scope: String,
}

/// Token endpoint failures, in OAuth2 error vocabulary.
#[derive(Debug)]
enum TokenError {
    InvalidRequest(&'static str),
    InvalidGrant,
    UnsupportedGrantType,
    Server(String),
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let (status, error, description) = match self {
            TokenError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg))
            }
            TokenError::InvalidGrant => (StatusCode::BAD_REQUEST, "invalid_grant", None),
            TokenError::UnsupportedGrantType => {
                (StatusCode::BAD_REQUEST, "unsupported_grant_type", None)
            }
            TokenError::Server(detail) => {
                tracing::error!(error = %detail, "token endpoint failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error", None)
            }
        };
        let body = ErrorResponse {
            error: error.to_string(),
            error_description: description.map(str::to_string),
        };
        no_store((status, Json(body)).into_response())
    }
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

// =============================================================================
// Endpoints
// =============================================================================

async fn validate_authorize(
    resources: &AppResources,
    request: AuthorizeRequest,
) -> Result<AuthorizeForm, ApiError> {
    if request.response_type != "code" {
        tracing::debug!(response_type = %request.response_type, "invalid response type");
        return Err(ApiError::Validation("invalid response_type parameter".into()));
    }

    let oauth = &resources.config.oauth2;
    let client_id =
        ClientId::parse(&request.client_id, oauth.allow_localhost_client).map_err(|e| {
            tracing::debug!(error = %e, client_id = %request.client_id, "client id is not valid");
            ApiError::Validation("invalid client_id parameter".into())
        })?;

    if request.state.is_empty() {
        tracing::debug!("empty state parameter");
        return Err(ApiError::Validation("invalid state parameter".into()));
    }

    let metadata = resources
        .client_metadata
        .resolve(&client_id, oauth.metadata_ttl())
        .await?;

    let redirect_uri = metadata
        .resolve_redirect_uri(&request.redirect_uri)
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::debug!(
                redirect_uri = %request.redirect_uri,
                "redirect uri not acceptable for client"
            );
            ApiError::Validation("invalid redirect_uri parameter".into())
        })?;

    Ok(AuthorizeForm {
        client_id,
        state: request.state,
        redirect_uri,
        redirect_uri_param: request.redirect_uri,
        metadata,
    })
}

/// Authorization endpoint: describe the pending grant.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start an authorization code flow",
    description = "Validates the request and resolves the client's metadata document from the URL \
                   given as `client_id`. Returns what the consent screen shows.\n\n\
                   `redirect_uri` may be omitted only when the client registers exactly one.",
    params(
        ("response_type" = String, Query, description = "Must be `code`."),
        ("client_id" = String, Query, description = "HTTPS URL of the client metadata document."),
        ("state" = String, Query, description = "Opaque value returned unchanged in the redirect."),
        ("redirect_uri" = Option<String>, Query, description = "One of the client's registered redirect URIs."),
    ),
    responses(
        (status = 200, description = "Consent required", body = ConsentResponse),
        (status = 400, description = "Invalid request or unreachable client metadata", body = ErrorResponse),
        (status = 401, description = "No active session", body = ErrorResponse),
    ),
    security(("session" = []))
)]
pub async fn authorize(
    Extension(resources): Extension<AppResources>,
    SessionUser(_user_id): SessionUser,
    RawQuery(query): RawQuery,
) -> Result<Json<ConsentResponse>, ApiError> {
    let request = AuthorizeRequest::from_params(collect_params(query.as_deref(), &[]));
    let form = validate_authorize(&resources, request).await?;
    let document = form.metadata.document;
    Ok(Json(ConsentResponse {
        client_id: form.client_id.to_string(),
        client_name: document.client_name,
        logo: form.metadata.cached_logo,
        client_uri: document.client_uri,
        tos_uri: document.tos_uri,
        policy_uri: document.policy_uri,
        redirect_uri: form.redirect_uri,
        state: form.state,
    }))
}

/// Authorization endpoint: the user approved.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Submit",
    summary = "Approve an authorization request",
    description = "Re-validates the request, issues a single-use authorization code and redirects \
                   to `{redirect_uri}?state=<state>&code=<code>`.\n\n\
                   Parameters are read from the query string and from an \
                   `application/x-www-form-urlencoded` body.",
    request_body(
        content = AuthorizeRequest,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 303, description = "Redirect back to the client with an authorization code"),
        (status = 400, description = "Invalid request or unreachable client metadata", body = ErrorResponse),
        (status = 401, description = "No active session", body = ErrorResponse),
    ),
    security(("session" = []))
)]
pub async fn authorize_submit(
    Extension(resources): Extension<AppResources>,
    SessionUser(user_id): SessionUser,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Redirect, ApiError> {
    let request = AuthorizeRequest::from_params(collect_params(query.as_deref(), &body));
    let form = validate_authorize(&resources, request).await?;

    let code = resources
        .codes
        .insert_code(user_id, form.client_id.as_str(), &form.redirect_uri_param)
        .await
        .map_err(ApiError::internal)?;

    let mut target = Url::parse(&form.redirect_uri).map_err(ApiError::internal)?;
    target
        .query_pairs_mut()
        .append_pair("state", &form.state)
        .append_pair("code", &code);
    tracing::info!(client_id = %form.client_id, "issued authorization code");
    Ok(Redirect::to(target.as_str()))
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: requires `code`, `client_id` and the same `redirect_uri` \
                   parameter that was sent to the authorization endpoint (empty if it was omitted)\n\
                   - `refresh_token`: rotates the pair; the old tokens stop working\n\n\
                   Parameters are read from the query string and from a form body. \
                   Codes are single-use: a failed exchange still consumes the code.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request or grant", body = ErrorResponse),
    )
)]
pub async fn token(
    Extension(resources): Extension<AppResources>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let params = collect_params(query.as_deref(), &body);
    let result = match params.get("grant_type").map(String::as_str) {
        Some("authorization_code") => authorization_code_grant(&resources, &params).await,
        Some("refresh_token") => refresh_token_grant(&resources, &params).await,
        Some(other) => {
            tracing::debug!(grant_type = %other, "unsupported grant type");
            Err(TokenError::UnsupportedGrantType)
        }
        None => Err(TokenError::InvalidRequest("grant_type is required")),
    };
    match result {
        Ok(pair) => {
            let tokens = &resources.oauth_tokens;
            no_store(
                Json(TokenResponse {
                    access_token: pair.access_token,
                    refresh_token: pair.refresh_token,
                    access_token_expires_in: tokens.access_ttl().as_secs(),
                    refresh_token_expires_in: tokens.refresh_ttl().as_secs(),
                    token_type: "bearer".to_string(),
                    scope: String::new(),
                })
                .into_response(),
            )
        }
        Err(e) => e.into_response(),
    }
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> &'a str {
    params.get(name).map(String::as_str).unwrap_or_default()
}

async fn authorization_code_grant(
    resources: &AppResources,
    params: &HashMap<String, String>,
) -> Result<TokenPair, TokenError> {
    let code = param(params, "code");
    if code.is_empty() {
        return Err(TokenError::InvalidRequest("code is required"));
    }

    // Redeem first: whatever happens next, the code cannot be used again.
    let stored = match resources.codes.delete_code(code).await {
        Ok(stored) => stored,
        Err(CodeStoreError::NotFound) => {
            tracing::debug!("authorization code not found");
            return Err(TokenError::InvalidGrant);
        }
        Err(e) => return Err(TokenError::Server(e.to_string())),
    };

    if !constant_time_eq(stored.code.as_bytes(), code.as_bytes()) {
        tracing::debug!("stored code does not match presented code");
        return Err(TokenError::InvalidGrant);
    }
    let redirect_uri = param(params, "redirect_uri");
    if stored.redirect_uri != redirect_uri {
        tracing::debug!(%redirect_uri, "redirect_uri does not match the authorization request");
        return Err(TokenError::InvalidGrant);
    }
    let client_id = param(params, "client_id");
    if stored.client_id != client_id {
        tracing::debug!(%client_id, "client_id does not match the authorization request");
        return Err(TokenError::InvalidGrant);
    }

    let pair = resources
        .oauth_tokens
        .issue_token_pair(stored.user_id)
        .await
        .map_err(|e| TokenError::Server(e.to_string()))?;
    tracing::info!(user_id = %stored.user_id, %client_id, "issued oauth token pair");
    Ok(pair)
}

async fn refresh_token_grant(
    resources: &AppResources,
    params: &HashMap<String, String>,
) -> Result<TokenPair, TokenError> {
    let refresh_token = param(params, "refresh_token");
    if refresh_token.is_empty() {
        return Err(TokenError::InvalidRequest("refresh_token is required"));
    }
    resources
        .oauth_tokens
        .refresh_token_pair(refresh_token)
        .await
        .map_err(|e| match e {
            TokenStoreError::RefreshTokenNotFound => TokenError::InvalidGrant,
            other => TokenError::Server(other.to_string()),
        })
}

/// Serves a client logo that was fetched while resolving client metadata.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/logo/{id}",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Client Logo",
    summary = "Cached client logo",
    params(("id" = String, Path, description = "Logo identifier from the consent response")),
    responses(
        (status = 200, description = "The logo image, with its original content type"),
        (status = 404, description = "Not cached", body = ErrorResponse),
    )
)]
pub async fn logo(
    Extension(resources): Extension<AppResources>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let cached = resources
        .logos
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Logo not found".into()))?;
    let bytes = cached.bytes().map_err(ApiError::internal)?;
    let content_type =
        HeaderValue::from_str(&cached.content_type).map_err(ApiError::internal)?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static("default-src 'none'; sandbox"),
            ),
            (header::CONTENT_DISPOSITION, HeaderValue::from_static("inline")),
        ],
        bytes,
    )
        .into_response())
}
