//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::auth::{AUTH_TAG, cookies::ACCESS_TOKEN_COOKIE};
use crate::identity::IDENTITY_TAG;
use crate::messages::MESSAGES_TAG;
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // OAuth access tokens and federated identity tokens
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "An access token from `/api/v1/oauth/token`, or on federation endpoints an \
                     identity token signed by the caller's server.",
                ))
                .build();
            components.add_security_scheme("bearer", SecurityScheme::Http(bearer));

            let session = ApiKey::Cookie(ApiKeyValue::with_description(
                ACCESS_TOKEN_COOKIE,
                "Session cookie set by the register and login endpoints.",
            ));
            components.add_security_scheme("session", SecurityScheme::ApiKey(session));
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Chat Trust Core API",
        version = "1.0.0",
        description = "Accounts, OAuth2 authorization for metadata-document clients and cross-server identity."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = AUTH_TAG, description = "First-party session endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server endpoints"),
        (name = IDENTITY_TAG, description = "Cross-server identity endpoints"),
        (name = MESSAGES_TAG, description = "Client message envelope")
    )
)]
pub struct ApiDoc;
