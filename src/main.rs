//! Storefront Order Ledger - local-first order service with remote sync

use anyhow::{Context, Result};
use std::sync::Arc;
use storefront_ledger::api::{self, AppState};
use storefront_ledger::config::Config;
use storefront_ledger::store::{self, Stores};
use storefront_ledger::sync::{HttpRemoteOrderService, SyncReconciler, SyncWorker};
use storefront_ledger::ProductDraft;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let pool = store::connect(&config.database_url).await?;
    let stores = Stores::new(pool);

    if let Some(path) = &config.catalog_seed_path {
        let raw = tokio::fs::read_to_string(path).await.with_context(|| format!("reading catalog seed {}", path.display()))?;
        let drafts: Vec<ProductDraft> = serde_json::from_str(&raw).with_context(|| format!("parsing catalog seed {}", path.display()))?;
        stores.catalog.seed_if_empty(&drafts).await?;
    }

    let shutdown = CancellationToken::new();
    let (sync, reconciler, worker) = match &config.remote_orders_url {
        Some(url) => {
            let remote = HttpRemoteOrderService::new(url.as_str(), config.sync_timeout)?;
            let reconciler = Arc::new(
                SyncReconciler::new(stores.ledger.clone(), Arc::new(remote), config.retry_policy()).with_cancellation(shutdown.child_token()),
            );
            let (worker, handle) = SyncWorker::new(reconciler.clone(), config.sync_interval, config.sync_queue_capacity, shutdown.clone());
            tracing::info!(remote = %url, "Order sync enabled");
            (Some(handle), Some(reconciler), Some(worker.spawn()))
        }
        None => {
            tracing::warn!("REMOTE_ORDERS_URL not set, orders stay local");
            (None, None, None)
        }
    };

    let state = AppState { stores, sync, reconciler, low_stock_threshold: config.low_stock_threshold };
    let app = api::router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Storefront ledger listening on 0.0.0.0:{}", config.port);
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(worker) = worker {
        worker.await.context("sync worker panicked")?;
    }
    Ok(())
}
