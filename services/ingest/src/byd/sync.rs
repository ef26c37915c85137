use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;

use bydsync_config::EntityDefinition;
use bydsync_db::watermark::repositories::WatermarkRepository;

use super::client::ByDClient;
use super::normalize::normalize_batch;
use super::query::build_delta_query;
use crate::report::{
    EntityOutcome, EntityReport, FailureKind, RunFailure, RunState, SyncRunReport,
};

/// Drives one delta sync across every configured entity.
pub struct SyncOrchestrator<W> {
    config_id: i64,
    client: ByDClient,
    entities: Arc<[EntityDefinition]>,
    watermark_repo: W,
    deadline: Option<Duration>,
}

impl<W> SyncOrchestrator<W>
where
    W: WatermarkRepository,
{
    pub fn new(
        config_id: i64,
        client: ByDClient,
        entities: Vec<EntityDefinition>,
        watermark_repo: W,
    ) -> Self {
        Self {
            config_id,
            client,
            entities: entities.into(),
            watermark_repo,
            deadline: None,
        }
    }

    /// Bound the whole run. On expiry every in-flight pipeline is aborted.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn entities(&self) -> &[EntityDefinition] {
        &self.entities
    }

    pub async fn run(&self) -> SyncRunReport {
        self.run_as(Uuid::new_v4()).await
    }

    /// Run under a caller-chosen id (the run registry hands out ids up front).
    pub async fn run_as(&self, run_id: Uuid) -> SyncRunReport {
        let started_at = Utc::now();
        let report = match self.deadline {
            // Dropping `execute` drops its JoinSet, which aborts the pipelines.
            Some(deadline) => match tokio::time::timeout(deadline, self.execute(run_id)).await {
                Ok(report) => report,
                Err(_) => {
                    tracing::error!(%run_id, ?deadline, "sync run exceeded deadline, aborted");
                    SyncRunReport::failed(
                        run_id,
                        started_at,
                        RunFailure::DeadlineExceeded(format!(
                            "run did not finish within {}s",
                            deadline.as_secs()
                        )),
                    )
                }
            },
            None => self.execute(run_id).await,
        };

        log_report(&report);
        report
    }

    async fn execute(&self, run_id: Uuid) -> SyncRunReport {
        let started_at = Utc::now();
        tracing::debug!(%run_id, state = ?RunState::Idle, "sync run created");

        tracing::debug!(%run_id, state = ?RunState::LoadingWatermark, config_id = self.config_id, "loading watermark");
        let watermark = match self.watermark_repo.get(self.config_id).await {
            Ok(record) => record.last_run,
            Err(e) => {
                tracing::error!(%run_id, error = %e, "watermark unavailable, aborting run");
                return SyncRunReport::failed(
                    run_id,
                    started_at,
                    RunFailure::ConfigUnavailable(e.to_string()),
                );
            }
        };
        tracing::info!(%run_id, last_run = %watermark, "watermark loaded");

        tracing::debug!(%run_id, state = ?RunState::Fetching, entities = self.entities.len(), "fetching entities");
        let mut pipelines = JoinSet::new();
        for (index, entity) in self.entities.iter().enumerate() {
            let client = self.client.clone();
            let entity = entity.clone();
            let watermark = watermark.clone();
            pipelines.spawn(async move {
                let outcome = sync_entity(&client, &entity, &watermark).await;
                (index, outcome)
            });
        }

        tracing::debug!(%run_id, state = ?RunState::Aggregating, "waiting for entity pipelines");
        let mut outcomes: Vec<Option<EntityOutcome>> = vec![None; self.entities.len()];
        while let Some(joined) = pipelines.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => tracing::error!(%run_id, error = %e, "entity pipeline panicked"),
            }
        }

        let entities = self
            .entities
            .iter()
            .zip(outcomes)
            .map(|(entity, outcome)| EntityReport {
                entity: entity.name.clone(),
                outcome: outcome.unwrap_or_else(|| EntityOutcome::Failed {
                    reason: FailureKind::Remote,
                    message: "entity pipeline terminated abnormally".to_string(),
                }),
            })
            .collect();

        SyncRunReport {
            run_id,
            state: RunState::Done,
            failure: None,
            watermark: Some(watermark),
            started_at,
            finished_at: Utc::now(),
            entities,
        }
    }
}

/// One pipeline: build query, fetch, normalize.
async fn sync_entity(client: &ByDClient, entity: &EntityDefinition, watermark: &str) -> EntityOutcome {
    let query = build_delta_query(entity, watermark);
    tracing::info!(entity = %entity.name, endpoint = %entity.endpoint, "retrieving byd objects");

    let raws = match client.fetch(&query).await {
        Ok(raws) => raws,
        Err(e) => {
            tracing::error!(entity = %entity.name, error = %e, "byd fetch failed");
            let reason = if e.is_auth() {
                FailureKind::Auth
            } else {
                FailureKind::Remote
            };
            return EntityOutcome::Failed {
                reason,
                message: e.to_string(),
            };
        }
    };

    let fetched = raws.len();
    let (records, dropped) = normalize_batch(raws, &entity.id_attribute);
    tracing::info!(entity = %entity.name, fetched, dropped, "byd objects retrieved");

    EntityOutcome::Synced {
        fetched,
        dropped,
        records,
    }
}

fn log_report(report: &SyncRunReport) {
    if let Some(failure) = &report.failure {
        tracing::error!(run_id = %report.run_id, ?failure, "sync run failed");
        return;
    }

    for entity in &report.entities {
        match &entity.outcome {
            EntityOutcome::Synced {
                fetched,
                dropped,
                records,
            } => {
                tracing::info!(
                    run_id = %report.run_id,
                    entity = %entity.entity,
                    fetched,
                    dropped,
                    normalized = records.len(),
                    "entity synced"
                );
                for record in records {
                    tracing::debug!(entity = %entity.entity, generic_id = ?record.generic_id, updated = record.updated, "record");
                }
            }
            EntityOutcome::Failed { reason, message } => {
                tracing::warn!(
                    run_id = %report.run_id,
                    entity = %entity.entity,
                    ?reason,
                    error = %message,
                    "entity sync failed"
                );
            }
        }
    }

    tracing::info!(
        run_id = %report.run_id,
        all_succeeded = report.all_succeeded(),
        "sync run completed"
    );
}
