//! ledgerbox-worker — attachment processing daemon.
//!
//! Connects to PostgreSQL, builds the configured storage backend, and
//! drains the attachment job queue until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerbox_core::JobRepository;
use ledgerbox_db::Database;
use ledgerbox_pipeline::{
    AttachmentHandler, AttachmentPipeline, NoopScanner, SpoolDirProvider, WorkerBuilder,
    WorkerConfig,
};
use ledgerbox_storage::{LocalBackend, ObjectStore, StorageConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "info,ledgerbox_pipeline=debug,ledgerbox_db=info,sqlx=warn".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::connect(&database_url).await?;

    let storage_config = StorageConfig::from_env()?;
    let backend = storage_config.build()?;
    if backend.kind() == ledgerbox_core::StorageKind::Local {
        LocalBackend::new(&storage_config.local_root)
            .validate()
            .await
            .map_err(|e| anyhow::anyhow!("storage validation failed: {}", e))?;
    }
    let store = ObjectStore::new(backend);

    // Real provider clients are injected by the deployment; the spool
    // directory implementation serves development and integration tests.
    let spool_dir = std::env::var("PROVIDER_SPOOL_DIR")
        .unwrap_or_else(|_| "/var/ledgerbox/spool".to_string());
    let provider = Arc::new(SpoolDirProvider::new(spool_dir));
    let scanner = Arc::new(NoopScanner);

    let pipeline = Arc::new(AttachmentPipeline::new(
        db.clone(),
        store,
        provider,
        scanner,
    ));

    let worker = WorkerBuilder::new(db.clone())
        .with_config(WorkerConfig::from_env())
        .with_handler(AttachmentHandler::new(pipeline))
        .build()
        .await;

    let handle = worker.start();
    info!("ledgerbox worker running; press ctrl-c to stop");

    // Hourly housekeeping: enforce job retention windows and report pool
    // health.
    let housekeeping_db = db;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(3600));
        tick.tick().await;
        loop {
            tick.tick().await;
            ledgerbox_db::log_pool_metrics(housekeeping_db.pool());
            match housekeeping_db.jobs.cleanup_finished().await {
                Ok(removed) if removed > 0 => {
                    info!(removed, "cleaned up finished job rows")
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "job cleanup failed"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.shutdown().await?;

    Ok(())
}
