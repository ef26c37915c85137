use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use bydsync_db::watermark::repositories::WatermarkRepository;

use crate::byd::sync::SyncOrchestrator;
use crate::report::{RunFailure, SyncRunReport};

pub const STARTED_MESSAGE: &str = "get ByD objects Started";
pub const DEFAULT_RUN_RETENTION: usize = 100;

/// Opaque reference to a submitted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RunHandle(pub Uuid);

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Running { started_at: DateTime<Utc> },
    Finished { report: SyncRunReport },
}

/// Immediate acknowledgement handed back to the trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub status_code: u16,
    pub body: TriggerBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBody {
    pub message: String,
    pub run_id: Uuid,
}

impl TriggerResponse {
    pub fn accepted(handle: RunHandle) -> Self {
        Self {
            status_code: 200,
            body: TriggerBody {
                message: STARTED_MESSAGE.to_string(),
                run_id: handle.0,
            },
        }
    }
}

#[derive(Default)]
struct RunTable {
    statuses: HashMap<Uuid, RunStatus>,
    /// Finished run ids, oldest first.
    finished: VecDeque<Uuid>,
}

impl RunTable {
    fn finish(&mut self, run_id: Uuid, report: SyncRunReport) {
        self.statuses.insert(run_id, RunStatus::Finished { report });
        self.finished.push_back(run_id);
    }

    fn evict(&mut self, keep: usize) -> usize {
        let mut evicted = 0;
        while self.finished.len() > keep {
            if let Some(run_id) = self.finished.pop_front() {
                self.statuses.remove(&run_id);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Tracks submitted runs so completion is observable after the trigger returns.
///
/// Only the newest `retention` finished runs are kept; running ones are never
/// evicted.
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<RwLock<RunTable>>,
    retention: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RUN_RETENTION)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            runs: Arc::new(RwLock::new(RunTable::default())),
            retention: retention.max(1),
        }
    }

    /// Start a run in the background and return its handle right away.
    pub async fn submit<W>(&self, orchestrator: Arc<SyncOrchestrator<W>>) -> RunHandle
    where
        W: WatermarkRepository + 'static,
    {
        let handle = RunHandle(Uuid::new_v4());
        let started_at = Utc::now();
        {
            let mut runs = self.runs.write().await;
            let evicted = runs.evict(self.retention);
            if evicted > 0 {
                tracing::debug!(evicted, "evicted finished sync runs");
            }
            runs.statuses.insert(handle.0, RunStatus::Running { started_at });
        }
        tracing::info!(run_id = %handle.0, "sync run submitted");

        let runs = Arc::clone(&self.runs);
        let retention = self.retention;
        let run = tokio::spawn(async move { orchestrator.run_as(handle.0).await });
        tokio::spawn(async move {
            let report = match run.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(run_id = %handle.0, error = %e, "sync run task aborted");
                    SyncRunReport::failed(
                        handle.0,
                        started_at,
                        RunFailure::Aborted(format!("run task terminated abnormally: {e}")),
                    )
                }
            };
            let mut runs = runs.write().await;
            runs.finish(handle.0, report);
            runs.evict(retention);
        });

        handle
    }

    pub async fn status(&self, handle: &RunHandle) -> Option<RunStatus> {
        self.runs.read().await.statuses.get(&handle.0).cloned()
    }

    /// Wait until a run leaves `Running`, polling at `interval`.
    ///
    /// `None` when the handle is unknown or was evicted.
    pub async fn wait(
        &self,
        handle: &RunHandle,
        interval: std::time::Duration,
    ) -> Option<SyncRunReport> {
        loop {
            match self.status(handle).await? {
                RunStatus::Finished { report } => return Some(report),
                RunStatus::Running { .. } => tokio::time::sleep(interval).await,
            }
        }
    }

    /// Number of runs currently tracked, running or finished.
    pub async fn len(&self) -> usize {
        self.runs.read().await.statuses.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byd::client::{ByDClient, ByDClientConfig};
    use crate::report::RunState;
    use async_trait::async_trait;
    use bydsync_common::error::SyncResult;
    use bydsync_config::EntityDefinition;
    use bydsync_db::watermark::memory_repository::MemoryWatermarkRepository;
    use bydsync_db::watermark::models::WatermarkRecord;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct PanickingStore;

    #[async_trait]
    impl WatermarkRepository for PanickingStore {
        async fn get(&self, _config_id: i64) -> SyncResult<WatermarkRecord> {
            panic!("watermark store blew up");
        }

        async fn set(&self, _config_id: i64, _last_run: &str) -> SyncResult<WatermarkRecord> {
            panic!("watermark store blew up");
        }
    }

    fn orchestrator<W: WatermarkRepository>(base_url: &str, store: W) -> Arc<SyncOrchestrator<W>> {
        let client = ByDClient::new(ByDClientConfig {
            base_url: base_url.to_string(),
            auth: "dXNlcjpwYXNz".to_string(),
            timeout_secs: 5,
            max_retries: 0,
            max_pages: 10,
        })
        .unwrap();
        let entities = vec![EntityDefinition::new(
            "Customers",
            "/CustomerCollection",
            "InternalID",
        )];
        Arc::new(SyncOrchestrator::new(0, client, entities, store))
    }

    #[test]
    fn trigger_response_shape() {
        let id = Uuid::new_v4();
        let response = TriggerResponse::accepted(RunHandle(id));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["body"]["message"], "get ByD objects Started");
        assert_eq!(json["body"]["runId"], id.to_string());
    }

    #[tokio::test]
    async fn submit_returns_before_run_completes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"d": {"results": []}}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let registry = RunRegistry::new();
        let store = MemoryWatermarkRepository::seeded(0, "2020-09-13T09:31:06.393Z");
        let handle = registry.submit(orchestrator(&server.uri(), store)).await;

        assert!(matches!(
            registry.status(&handle).await,
            Some(RunStatus::Running { .. })
        ));

        let report = registry
            .wait(&handle, Duration::from_millis(20))
            .await
            .expect("run is registered");
        assert_eq!(report.run_id, handle.0);
        assert_eq!(report.state, RunState::Done);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn failed_run_is_observable() {
        let server = MockServer::start().await;
        let registry = RunRegistry::new();
        let handle = registry
            .submit(orchestrator(&server.uri(), MemoryWatermarkRepository::new()))
            .await;

        let report = registry
            .wait(&handle, Duration::from_millis(10))
            .await
            .expect("run is registered");
        assert_eq!(report.state, RunState::Failed);
        assert!(matches!(report.failure, Some(RunFailure::ConfigUnavailable(_))));
    }

    #[tokio::test]
    async fn unknown_handle_has_no_status() {
        let registry = RunRegistry::new();
        assert!(registry.status(&RunHandle(Uuid::new_v4())).await.is_none());
    }

    #[tokio::test]
    async fn panicking_run_is_recorded_as_aborted() {
        let server = MockServer::start().await;
        let registry = RunRegistry::new();
        let handle = registry
            .submit(orchestrator(&server.uri(), PanickingStore))
            .await;

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            registry.wait(&handle, Duration::from_millis(10)),
        )
        .await
        .expect("wait should not hang on a panicked run")
        .expect("run is registered");

        assert_eq!(report.run_id, handle.0);
        assert_eq!(report.state, RunState::Failed);
        match report.failure {
            Some(RunFailure::Aborted(msg)) => assert!(msg.contains("terminated abnormally")),
            other => panic!("expected Aborted, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oldest_finished_runs_are_evicted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"d": {"results": []}})),
            )
            .mount(&server)
            .await;

        let registry = RunRegistry::with_retention(3);
        let store = MemoryWatermarkRepository::seeded(0, "2020-09-13T09:31:06.393Z");
        let orchestrator = orchestrator(&server.uri(), store);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let handle = registry.submit(Arc::clone(&orchestrator)).await;
            registry
                .wait(&handle, Duration::from_millis(5))
                .await
                .expect("run is registered until it finishes");
            handles.push(handle);
        }

        assert_eq!(registry.len().await, 3);
        for old in &handles[..7] {
            assert!(registry.status(old).await.is_none());
        }
        for recent in &handles[7..] {
            assert!(matches!(
                registry.status(recent).await,
                Some(RunStatus::Finished { .. })
            ));
        }
    }

    #[tokio::test]
    async fn running_runs_are_not_evicted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"d": {"results": []}}))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;

        let registry = RunRegistry::with_retention(1);
        let store = MemoryWatermarkRepository::seeded(0, "2020-09-13T09:31:06.393Z");
        let orchestrator = orchestrator(&server.uri(), store);

        let first = registry.submit(Arc::clone(&orchestrator)).await;
        let second = registry.submit(Arc::clone(&orchestrator)).await;
        // Retention only bounds finished runs.
        assert_eq!(registry.len().await, 2);
        assert!(matches!(registry.status(&first).await, Some(RunStatus::Running { .. })));
        assert!(matches!(registry.status(&second).await, Some(RunStatus::Running { .. })));

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(registry.len().await, 1);
    }
}
