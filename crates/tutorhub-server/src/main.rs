//! # tutorhub-server
//!
//! HTTP backend of the tutoring marketplace.
//!
//! This binary provides:
//! - **REST API** (axum) for offerings, acceptance, messaging, earnings and
//!   the notification inbox
//! - **Offering page cache** in front of the listing query
//! - **Attachment storage** on the local filesystem
//! - **Notification fan-out** over the inbox, mail, broadcast and push
//!   channels

mod api;
mod blob_store;
mod config;
mod error;
mod marketplace;
mod notify;
mod page_cache;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;

use tutorhub_store::Database;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;
use crate::marketplace::Marketplace;
use crate::notify::Notifier;
use crate::page_cache::{MemoryCacheStore, OfferingPageCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tutorhub_server=debug")),
        )
        .init();

    info!("Starting tutorhub server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(
        fee_rate = %config.fee_rate,
        settlement_enabled = config.settlement_token.is_some(),
        "Marketplace settings"
    );

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    info!(path = ?db.path(), "Database ready");
    let db = Arc::new(Mutex::new(db));

    // Blob store (creates directory if missing)
    let blobs = Arc::new(
        BlobStore::new(config.blob_storage_path.clone(), config.max_attachment_size).await?,
    );
    info!(max_size = blobs.max_size(), "Attachment storage ready");

    let cache = OfferingPageCache::new(Arc::new(MemoryCacheStore::new()), config.cache_ttl);
    let notifier = Notifier::console(db.clone(), config.public_base_url.clone());
    let market = Marketplace::new(db, cache, blobs, notifier, config.fee_rate);

    let app_state = AppState {
        market: market.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Expired listing pages are dropped on read; this sweeps the ones nobody
    // asks for again.
    let purge_every = config.cache_ttl.max(std::time::Duration::from_secs(60));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            let removed = market.cache().purge_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Purged expired offering pages");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
