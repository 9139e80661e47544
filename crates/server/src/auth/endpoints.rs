//! Session HTTP endpoints under `/api/v1/auth`.

use super::AUTH_TAG;
use super::cookies::{
    ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, access_token_cookie, cleared_cookies,
    refresh_token_cookie,
};
use super::extract::SessionUser;
use super::service::{RegisterParams, Session};
use crate::AppResources;
use crate::entity::user;
use crate::error::{ApiError, ErrorResponse};
use crate::tokens::TokenPair;
use axum::{Extension, Json, http::StatusCode};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
        .routes(routes!(refresh))
        .routes(routes!(logout))
        .routes(routes!(me))
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Generated when omitted
    pub username: Option<String>,
    /// Required together with `password`; omit both for an anonymous account
    pub email: Option<String>,
    pub password: Option<String>,
    /// Defaults to the username
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email address
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub display_name: String,
    pub anonymous: bool,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        let anonymous = user.is_anonymous();
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            anonymous,
        }
    }
}

fn with_session_cookies(jar: CookieJar, resources: &AppResources, tokens: &TokenPair) -> CookieJar {
    let secure = resources.config.cookies.secure;
    let ttl = &resources.config.tokens;
    jar.add(access_token_cookie(
        &tokens.access_token,
        ttl.access_ttl(),
        secure,
    ))
    .add(refresh_token_cookie(
        &tokens.refresh_token,
        ttl.refresh_ttl(),
        secure,
    ))
}

fn session_response(
    jar: CookieJar,
    resources: &AppResources,
    session: Session,
) -> (CookieJar, Json<UserResponse>) {
    let jar = with_session_cookies(jar, resources, &session.tokens);
    (jar, Json(session.user.into()))
}

/// Create an account and sign it in.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/register",
    tag = AUTH_TAG,
    operation_id = "Register",
    summary = "Create an account",
    description = "Creates a local account and sets the session cookies.\n\n\
                   Omitting both `email` and `password` creates an anonymous account. \
                   Supplying only one of them is rejected.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse),
    )
)]
pub async fn register(
    Extension(resources): Extension<AppResources>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<UserResponse>), ApiError> {
    let session = resources
        .accounts
        .register(RegisterParams {
            username: body.username,
            email: body.email,
            password: body.password,
            display_name: body.display_name,
        })
        .await?;
    let (jar, body) = session_response(jar, &resources, session);
    Ok((StatusCode::CREATED, jar, body))
}

/// Sign in with a password.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Login",
    summary = "Sign in",
    description = "Signs in with a username or email address and a password. \
                   Unknown users and wrong passwords produce the same error.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = UserResponse),
        (status = 400, description = "Missing login or password", body = ErrorResponse),
        (status = 401, description = "Incorrect credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    Extension(resources): Extension<AppResources>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<UserResponse>), ApiError> {
    let session = resources.accounts.login(&body.login, &body.password).await?;
    Ok(session_response(jar, &resources, session))
}

/// Rotate the session token pair using the refresh cookie.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/refresh",
    tag = AUTH_TAG,
    operation_id = "Refresh Session",
    summary = "Rotate session tokens",
    description = "Exchanges the `refreshToken` cookie for a new token pair. \
                   The previous pair stops working.",
    responses(
        (status = 204, description = "New cookies set"),
        (status = 401, description = "Missing or unknown refresh token", body = ErrorResponse),
    )
)]
pub async fn refresh(
    Extension(resources): Extension<AppResources>,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), ApiError> {
    let refresh_token = jar
        .get(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ApiError::Unauthenticated)?;
    let tokens = resources.accounts.refresh(&refresh_token).await?;
    let jar = with_session_cookies(jar, &resources, &tokens);
    Ok((StatusCode::NO_CONTENT, jar))
}

/// Revoke the current session.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/logout",
    tag = AUTH_TAG,
    operation_id = "Logout",
    summary = "Sign out",
    description = "Revokes both tokens of the current session and clears the cookies.",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "No active session", body = ErrorResponse),
    )
)]
pub async fn logout(
    Extension(resources): Extension<AppResources>,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), ApiError> {
    let access_token = jar
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ApiError::Unauthenticated)?;
    resources.accounts.logout(&access_token).await?;
    let [access, refresh] = cleared_cookies();
    Ok((StatusCode::NO_CONTENT, jar.add(access).add(refresh)))
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/me",
    tag = AUTH_TAG,
    operation_id = "Current User",
    summary = "Signed-in user",
    responses(
        (status = 200, description = "The signed-in user", body = UserResponse),
        (status = 401, description = "No active session", body = ErrorResponse),
    )
)]
pub async fn me(
    Extension(resources): Extension<AppResources>,
    SessionUser(user_id): SessionUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = resources
        .accounts
        .find_user(user_id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    Ok(Json(user.into()))
}
