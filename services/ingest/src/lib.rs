pub mod byd;
pub mod report;
pub mod runs;

use std::sync::Arc;
use std::time::Duration;

use bydsync_common::error::{SyncError, SyncResult};
use bydsync_config::{AppConfig, WatermarkBackend};
use bydsync_db::watermark::memory_repository::MemoryWatermarkRepository;
use bydsync_db::watermark::pg_repository::PgWatermarkRepository;
use bydsync_db::watermark::repositories::WatermarkRepository;

use crate::byd::client::{ByDClient, ByDClientConfig};
use crate::byd::sync::SyncOrchestrator;

pub type DynWatermarkRepository = Arc<dyn WatermarkRepository>;

/// Open the watermark store selected by configuration.
pub async fn open_watermark_store(config: &AppConfig) -> SyncResult<DynWatermarkRepository> {
    match &config.watermark {
        WatermarkBackend::Local { last_run } => {
            tracing::info!(config_id = config.config_id, "using local watermark store");
            Ok(Arc::new(MemoryWatermarkRepository::seeded(
                config.config_id,
                last_run,
            )))
        }
        WatermarkBackend::Postgres {
            database_url,
            table,
        } => {
            let pool = bydsync_db::create_pool(database_url).await?;
            Ok(Arc::new(PgWatermarkRepository::new(pool, table)?))
        }
    }
}

/// Wire config, client and store into a ready orchestrator.
pub async fn build_orchestrator(
    config: &AppConfig,
    client_config: ByDClientConfig,
) -> SyncResult<SyncOrchestrator<DynWatermarkRepository>> {
    let client = ByDClient::new(client_config)
        .map_err(|e| SyncError::Config(format!("failed to build http client: {e}")))?;
    let store = open_watermark_store(config).await?;

    Ok(
        SyncOrchestrator::new(config.config_id, client, config.entities.clone(), store)
            .with_deadline(Duration::from_secs(config.run_deadline_secs)),
    )
}
