//! Typed message envelope for signed-in clients.
//!
//! Every request is one variant of [`ClientMessage`], selected by its `type`
//! field, and is answered by one [`ServerMessage`]. An unknown `type` never
//! reaches [`dispatch`]; the JSON extractor rejects it.

use crate::AppResources;
use crate::auth::ApiUser;
use crate::entity::user_server;
use crate::error::{ApiError, ErrorResponse};
use crate::validation::server_name::validate_server_name;
use axum::{Extension, Json};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    sea_query::OnConflict,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

/// OpenAPI tag for the message endpoint.
pub const MESSAGES_TAG: &str = "Messages";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(post_message))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a short-lived token proving the caller's identity to other
    /// servers.
    GetIdentityToken,
    /// Remember that the caller joined `host`.
    AddUserServer { host: String },
    /// List the servers the caller joined.
    GetUserServers,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    IdentityToken { token: String },
    UserServerAdded { host: String },
    UserServers { servers: Vec<String> },
    /// The request was understood but could not be carried out.
    Error { message: String },
}

/// Runs one client message for `user_id`.
///
/// Rejected input is answered with [`ServerMessage::Error`]. Storage and
/// signing failures are internal errors.
#[tracing::instrument(skip(resources))]
pub async fn dispatch(
    resources: &AppResources,
    user_id: Uuid,
    message: ClientMessage,
) -> Result<ServerMessage, ApiError> {
    match message {
        ClientMessage::GetIdentityToken => {
            let token = resources
                .signer
                .sign(&resources.config.host, user_id)
                .map_err(ApiError::internal)?;
            Ok(ServerMessage::IdentityToken { token })
        }
        ClientMessage::AddUserServer { host } => {
            let host = host.trim().to_ascii_lowercase();
            if let Err(e) = validate_server_name(&host) {
                tracing::debug!(error = %e, "rejected user server");
                return Ok(ServerMessage::Error {
                    message: e.to_string(),
                });
            }
            add_user_server(&resources.db, user_id, &host).await?;
            Ok(ServerMessage::UserServerAdded { host })
        }
        ClientMessage::GetUserServers => {
            let servers = user_servers(&resources.db, user_id).await?;
            Ok(ServerMessage::UserServers { servers })
        }
    }
}

/// Records membership. Adding a server twice is not an error.
pub async fn add_user_server(
    db: &DatabaseConnection,
    user_id: Uuid,
    host: &str,
) -> Result<(), ApiError> {
    let model = user_server::ActiveModel {
        user_id: Set(user_id.to_string()),
        host: Set(host.to_string()),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    user_server::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([user_server::Column::UserId, user_server::Column::Host])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Servers in the order they were joined.
pub async fn user_servers(db: &DatabaseConnection, user_id: Uuid) -> Result<Vec<String>, ApiError> {
    Ok(user_server::Entity::find()
        .filter(user_server::Column::UserId.eq(user_id.to_string()))
        .order_by_asc(user_server::Column::CreatedAt)
        .order_by_asc(user_server::Column::Host)
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.host)
        .collect())
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/api/v1/messages",
    tag = MESSAGES_TAG,
    operation_id = "Send Message",
    summary = "Send a client message",
    description = "Accepts one message tagged by `type` and returns the server's reply.\n\n\
                   **Message types:**\n\
                   - `get_identity_token`\n\
                   - `add_user_server` with `host`\n\
                   - `get_user_servers`",
    request_body = ClientMessage,
    responses(
        (status = 200, description = "Reply to the message", body = ServerMessage),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 422, description = "Unknown message type or malformed message"),
    ),
    security(("bearer" = []))
)]
pub async fn post_message(
    Extension(resources): Extension<AppResources>,
    ApiUser(user_id): ApiUser,
    Json(message): Json<ClientMessage>,
) -> Result<Json<ServerMessage>, ApiError> {
    dispatch(&resources, user_id, message).await.map(Json)
}
