mod error;
mod sync;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use bydsync_config::{init_tracing, AppConfig};
use bydsync_ingest::byd::client::ByDClientConfig;
use bydsync_ingest::byd::sync::SyncOrchestrator;
use bydsync_ingest::runs::RunRegistry;
use bydsync_ingest::{build_orchestrator, DynWatermarkRepository};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator<DynWatermarkRepository>>,
    pub registry: RunRegistry,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let entities: Vec<&str> = state
        .orchestrator
        .entities()
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    Json(serde_json::json!({
        "name": "bydsync-api",
        "version": env!("CARGO_PKG_VERSION"),
        "entities": entities,
    }))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .merge(sync::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env().expect("failed to load config");
    init_tracing(&config.log_level);

    let client_config = ByDClientConfig::from_env().expect("failed to load byd config");
    tracing::info!(service = "bydsync-api", "starting");

    let orchestrator = build_orchestrator(&config, client_config)
        .await
        .expect("failed to build sync orchestrator");

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        registry: RunRegistry::with_retention(config.run_retention),
    };

    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
