use bydsync_config::{init_tracing, AppConfig};
use bydsync_ingest::build_orchestrator;
use bydsync_ingest::byd::client::ByDClientConfig;
use bydsync_ingest::report::RunState;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().expect("failed to load config");
    init_tracing(&config.log_level);

    tracing::info!(service = "bydsync-ingest", "starting");

    let client_config = ByDClientConfig::from_env().expect("failed to load byd config");

    tracing::info!(
        entities = ?config.entities.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        config_id = config.config_id,
        "byd connector configured, starting sync"
    );

    let orchestrator = build_orchestrator(&config, client_config)
        .await
        .expect("failed to build sync orchestrator");

    let report = orchestrator.run().await;

    match serde_json::to_string(&report) {
        Ok(json) => tracing::debug!(report = %json, "sync run report"),
        Err(e) => tracing::warn!(error = %e, "could not serialize run report"),
    }

    tracing::info!("ingest service finished");
    if report.state == RunState::Failed {
        std::process::exit(1);
    }
}
