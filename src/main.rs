use anyhow::Result;
use drive_store::config::{AppConfig, StorageConfig};
use drive_store::services::upload_service::DriveService;
use drive_store::store::ObjectStore;
use drive_store::store::{fs::FsObjectStore, s3::S3Store};
use drive_store::{db, routes};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting drive-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db: Arc<sqlx::SqlitePool> = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Handle migration mode ---
    if migrate {
        db::apply_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Construct the object-store backend ---
    let store: Arc<dyn ObjectStore> = match &cfg.storage {
        StorageConfig::Fs {
            storage_dir,
            public_base_url,
        } => {
            if !Path::new(storage_dir).exists() {
                fs::create_dir_all(storage_dir)?;
                tracing::info!("Created storage directory at {}", storage_dir);
            }
            Arc::new(FsObjectStore::new(storage_dir, public_base_url))
        }
        StorageConfig::S3 {
            bucket,
            region,
            endpoint_url,
            force_path_style,
        } => Arc::new(
            S3Store::new(
                bucket.clone(),
                region.clone(),
                endpoint_url.clone(),
                *force_path_style,
            )
            .await,
        ),
    };

    // --- Initialize core service + router ---
    let service = DriveService::new(db.clone(), store, cfg.limits.clone());
    let app = routes::routes(&cfg.allowed_origin, &cfg.limits).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Drain ---
    db.close().await;
    tracing::info!("Connection pool closed.");

    Ok(())
}

/// Resolve on SIGINT or SIGTERM so in-flight requests drain before the
/// process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
