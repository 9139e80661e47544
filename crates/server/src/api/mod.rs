//! HTTP surface.
//!
//! - `/api/v1/auth/*` - first-party sessions ([`crate::auth::endpoints`])
//! - `/api/v1/oauth/*` - authorization server ([`crate::oauth2::endpoints`])
//! - `/api/v1/federation/*` and `/.well-known/chat.json` - identity
//! - `/api/v1/messages` - client message envelope
//! - `/healthz` - health check
//! - `/api-docs` - OpenAPI documentation

pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::{AppResources, auth, identity, messages, oauth2};
use axum::{Extension, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the application router with every route and middleware layer.
pub fn router(resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/v1/auth", auth::endpoints::router())
        .nest("/api/v1/oauth", oauth2::router())
        .nest("/api/v1/federation", identity::endpoints::router())
        .merge(identity::endpoints::well_known_router())
        .merge(messages::router())
        .routes(routes!(health::health))
        .layer(Extension(resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Serves the application on the configured listen address until the
/// process is stopped.
#[tracing::instrument(skip_all)]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let addr = resources.config.listen_addr.clone();
    let app = router(resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server running");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
