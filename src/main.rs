//! Pizza Storefront - ordering backend

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pizza_storefront::api::{self, AppState};
use pizza_storefront::config::AppConfig;
use pizza_storefront::events::EventBus;
use pizza_storefront::payment::HttpPaymentGateway;
use pizza_storefront::repository::{PgCartRepository, PgCatalogRepository, PgOrderRepository};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into());
    tracing_subscriber::registry()
        .with(filter)
        .with(config.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!config.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    let db = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(config.database.url.expose_secret())
        .await
        .context("failed to connect to database")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, order events will only be logged");
                None
            }
        },
        None => None,
    };

    let gateway = HttpPaymentGateway::new(&config.gateway)?;
    let state = AppState::new(
        Arc::new(PgCatalogRepository::new(db.clone())),
        Arc::new(PgCartRepository::new(db.clone())),
        Arc::new(PgOrderRepository::new(db)),
        Arc::new(gateway),
        EventBus::new(nats),
        config.pricing.policy(),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("🍕 Pizza storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, api::router(state)).await?;
    Ok(())
}
