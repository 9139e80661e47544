use chat_trust_core::AppResources;
use chat_trust_core::api::start_webserver;
use chat_trust_core::config::load_config_or_panic;
use chat_trust_core::fetch::{SafeFetcher, SharedFetcher};
use chat_trust_core::store;
use hickory_resolver::Resolver;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "chat_trust_core=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let layer = fmt::layer().with_target(true).with_level(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    initialize_tracing();

    let config = Arc::new(load_config_or_panic());
    tracing::info!(host = %config.host, listen_addr = %config.listen_addr, "configuration loaded");

    let db = Arc::new(Database::connect(&config.database_url).await?);
    let kv = store::connect(config.redis_url.as_deref()).await?;

    let resolver = Resolver::builder_tokio()?.build();
    let fetcher: SharedFetcher = Arc::new(SafeFetcher::new(resolver, &config.fetcher)?);

    let resources = AppResources::new(config, db, kv, fetcher)?;
    start_webserver(resources).await
}
