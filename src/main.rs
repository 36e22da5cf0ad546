//! Storefront API server

use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use storefront_api::services::accounts::{ensure_bootstrap_admin, seed_access_control};
use storefront_api::services::events::EventPublisher;
use storefront_api::store::{MemoryStore, PgStore, Store};
use storefront_api::{app, AppConfig, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url.expose_secret(), config.database_max_connections).await.context("database connection failed")?;
            store.migrate().await.context("migrations failed")?;
            tracing::info!("Connected to PostgreSQL");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    seed_access_control(store.as_ref()).await.context("seeding roles and permissions failed")?;
    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(store.as_ref(), admin).await.context("creating bootstrap admin failed")?;
    }

    let addr = config.socket_addr();
    let nats_url = config.nats_url.clone();
    let mut state = AppState::new(config, store).context("failed to initialise integrations")?;
    if let Some(url) = nats_url {
        match EventPublisher::connect(&url).await {
            Ok(events) => state = state.with_events(events),
            Err(e) => tracing::warn!(error = %e, %url, "NATS unavailable, domain events will not be published"),
        }
    }

    let config = state.config();
    tracing::info!(
        vnpay = config.vnpay.is_some(),
        ai = config.gemini.is_some(),
        email = config.email.is_some(),
        "Integrations"
    );

    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("🚀 Storefront API listening on {}", addr);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
