//! Storefront cart API server

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_cart::api::repository::{CartRepository, MemoryCartRepository, PgCartRepository};
use storefront_cart::api::{self, AppState};
use storefront_cart::config::Config;
use storefront_cart::pricing::SharedRates;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let repo: Arc<dyn CartRepository> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await.context("connecting to Postgres")?;
            sqlx::migrate!("./migrations").run(&db).await?;
            Arc::new(PgCartRepository::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, carts are kept in memory");
            Arc::new(MemoryCartRepository::new())
        }
    };

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, cart events will not be published");
                None
            }
        },
        None => None,
    };

    let state = AppState::new(repo, Arc::new(SharedRates::new(config.rates.clone()))).with_nats(nats);
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("storefront cart listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
