//! # Trading Post Binary
//!
//! Assembles the stores, services and router selected by configuration and
//! compile-time features, then serves the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api_adapters::{router, AppState};
use configs::{AppConfig, DataBackend, LogFormat, LoggingConfig, MediaBackend, StorageConfig};
use domains::{BlobStore, DataStore};
use services::{Aggregator, AggregatorMetrics, AggregatorSettings, ListingService};
use storage_adapters::{DocumentDirectory, MemoryBlobStore, MemoryDataStore};

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn data_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn DataStore>> {
    match storage.backend {
        DataBackend::Memory => Ok(Arc::new(MemoryDataStore::new())),
        #[cfg(feature = "db-postgres")]
        DataBackend::Postgres => {
            use secrecy::ExposeSecret;
            use storage_adapters::postgres::PgDataStore;

            let url = storage
                .database_url
                .as_ref()
                .context("storage.database_url is not set")?;
            let store = PgDataStore::connect(url.expose_secret(), storage.max_connections)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("running migrations")?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "db-postgres"))]
        DataBackend::Postgres => {
            anyhow::bail!("postgres backend requested but built without `db-postgres`")
        }
    }
}

fn blob_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    match storage.media_backend {
        MediaBackend::Memory => Ok(Arc::new(MemoryBlobStore::new(storage.max_image_bytes))),
        #[cfg(feature = "media-local")]
        MediaBackend::Local => Ok(Arc::new(storage_adapters::local::LocalBlobStore::new(
            PathBuf::from(&storage.media_root),
            storage.max_image_bytes,
        ))),
        #[cfg(not(feature = "media-local"))]
        MediaBackend::Local => anyhow::bail!(
            "local media requested for {} but built without `media-local`",
            PathBuf::from(&storage.media_root).display()
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.logging);

    // 1. Storage implementations
    let store = data_store(&config.storage).await?;
    let blobs = blob_store(&config.storage)?;
    let directory = Arc::new(DocumentDirectory::new(store.clone()));

    // 2. Metrics
    let mut registry = Registry::with_prefix("trading_post");
    let metrics = AggregatorMetrics::new();
    metrics.register(&mut registry);

    // 3. Services
    let settings = AggregatorSettings {
        image_fetch_timeout: config.aggregator.image_fetch_timeout(),
        author_lookup_timeout: config.aggregator.author_lookup_timeout(),
        max_concurrent_resolutions: config.aggregator.max_concurrent_resolutions,
    };
    let aggregator = Aggregator::new(
        store.clone(),
        blobs.clone(),
        directory.clone(),
        settings,
        metrics,
    );
    let listings = ListingService::new(store, blobs, directory);

    let app = router(AppState {
        aggregator: Arc::new(aggregator),
        listings: Arc::new(listings),
        registry: Arc::new(registry),
    });

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        backend = ?config.storage.backend,
        media = ?config.storage.media_backend,
        "trading post listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("received SIGINT");
}
