use super::{IDENTITY_TAG, WellKnownDocument};
use crate::AppResources;
use crate::auth::FederatedUser;
use crate::error::ErrorResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Routes mounted at the server root.
pub fn well_known_router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(well_known))
}

/// Routes mounted under `/api/v1/federation`.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(whoami))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WhoamiResponse {
    pub user_id: String,
    pub host: String,
    /// `{user_id}@{host}`
    pub address: String,
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/.well-known/chat.json",
    tag = IDENTITY_TAG,
    operation_id = "Well-Known Identity Key",
    summary = "Public key for identity tokens",
    description = "Other servers fetch this document to verify identity tokens issued by this server.",
    responses(
        (status = 200, description = "The server's public key", body = WellKnownDocument),
    )
)]
pub async fn well_known(Extension(resources): Extension<AppResources>) -> Json<WellKnownDocument> {
    Json(resources.signer.well_known())
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/whoami",
    tag = IDENTITY_TAG,
    operation_id = "Federated Whoami",
    summary = "Resolve a federated caller",
    description = "Verifies the identity token in the `Authorization` header against the issuing \
                   server's published key and returns the caller's global address.",
    responses(
        (status = 200, description = "Verified caller", body = WhoamiResponse),
        (status = 401, description = "Missing or unverifiable identity token", body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn whoami(FederatedUser(address): FederatedUser) -> Json<WhoamiResponse> {
    tracing::debug!(%address, "federated caller verified");
    Json(WhoamiResponse {
        user_id: address.user_id.to_string(),
        host: address.host.clone(),
        address: address.to_string(),
    })
}
