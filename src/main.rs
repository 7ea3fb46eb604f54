use anyhow::{Context, Result};
use std::{fs, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::{AppConfig, RunMode};
use handlers::health_handlers::HealthState;
use services::{
    grant_signer::GrantSigner,
    local_store::LocalObjectStore,
    object_store::ObjectStore,
    propagator::CopyPropagator,
    recorder::MetadataRecorder,
    scanner::ScanOrchestrator,
    scheduler::Scheduler,
    table_store::{SqliteTableStore, TableStore},
    watermark::WatermarkStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;
    tracing::info!(
        "Starting blob-scanner: {} -> {} (table {}, every {:?})",
        cfg.source_container,
        cfg.target_container,
        cfg.table_name,
        cfg.interval
    );

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite + schema ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;
    if mode == RunMode::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Wire components ---
    let store: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(
            db.clone(),
            cfg.storage_dir.clone(),
            GrantSigner::new(&cfg.account_key),
        )
        .with_page_size(cfg.page_size),
    );
    let tables: Arc<dyn TableStore> = Arc::new(SqliteTableStore::new(db.clone()));

    let scanner = ScanOrchestrator::new(
        store.clone(),
        cfg.source_container.clone(),
        WatermarkStore::new(
            store.clone(),
            cfg.metadata_container.clone(),
            cfg.watermark_blob.clone(),
        ),
        CopyPropagator::new(
            store.clone(),
            cfg.source_container.clone(),
            cfg.target_container.clone(),
            cfg.grant_ttl,
            cfg.op_timeout,
        ),
        MetadataRecorder::new(tables, cfg.table_name.clone(), cfg.op_timeout),
    )
    .with_concurrency(cfg.concurrency);

    // --- Optional health server ---
    if let Some(addr) = &cfg.health_addr {
        let state = HealthState {
            db: db.clone(),
            storage_root: cfg.storage_dir.clone().into(),
        };
        let app = routes::routes::routes().with_state(state);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding health server to {}", addr))?;
        tracing::info!("Health server listening on http://{}", listener.local_addr()?);
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app).await {
                tracing::error!("Health server stopped: {}", err);
            }
        });
    }

    // --- Run ---
    match mode {
        RunMode::Once => {
            scanner.run().await?;
        }
        _ => {
            let scheduler = Scheduler::new(scanner, cfg.interval);
            scheduler
                .run_until(async {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        tracing::error!("Could not listen for Ctrl-C: {}", err);
                        std::future::pending::<()>().await;
                    }
                })
                .await;
        }
    }

    Ok(())
}
