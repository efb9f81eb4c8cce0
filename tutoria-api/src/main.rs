use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutoria_api::{app, AppState};
use tutoria_core::{BiddingMirror, DisabledBiddingMirror, EntityStore, LogNotifier, Notifier};
use tutoria_store::app_config::{Config, StoreBackend};
use tutoria_store::{HttpBiddingMirror, InMemoryStore, RedisStore, TimedStore, WebhookNotifier};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tutoria_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Tutoria API on port {}", config.server.port);

    let timeout = config.store.timeout();
    let store: Arc<dyn EntityStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(TimedStore::new(InMemoryStore::new(), timeout))
        }
        StoreBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("store.backend is redis but no [redis] section is configured")?;
            let store = RedisStore::new(&redis.url)
                .await
                .context("Failed to connect to Redis")?;
            Arc::new(TimedStore::new(store, timeout))
        }
    };

    let mirror: Arc<dyn BiddingMirror> = match &config.bidding.base_url {
        Some(base_url) => {
            tracing::info!("Mirroring bids to {}", base_url);
            let timeout = std::time::Duration::from_millis(config.bidding.timeout_ms);
            Arc::new(HttpBiddingMirror::new(base_url, timeout)?)
        }
        None => Arc::new(DisabledBiddingMirror),
    };

    let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
        Some(url) => {
            let timeout = std::time::Duration::from_millis(config.notifications.timeout_ms);
            Arc::new(WebhookNotifier::new(url, timeout)?)
        }
        None => Arc::new(LogNotifier),
    };

    let app_state = AppState::new(store, mirror, notifier);
    let workflow = app_state.workflow.clone();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Waiting for outstanding notifications");
    workflow.flush().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
