use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::byd::models::NormalizedRecord;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    LoadingWatermark,
    Fetching,
    Aggregating,
    Done,
    Failed,
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum RunFailure {
    ConfigUnavailable(String),
    DeadlineExceeded(String),
    /// The run task itself panicked or was cancelled.
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Remote,
    Auth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    Synced {
        fetched: usize,
        dropped: usize,
        records: Vec<NormalizedRecord>,
    },
    Failed {
        reason: FailureKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub entity: String,
    #[serde(flatten)]
    pub outcome: EntityOutcome,
}

impl EntityReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, EntityOutcome::Synced { .. })
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        match &self.outcome {
            EntityOutcome::Synced { records, .. } => records,
            EntityOutcome::Failed { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub failure: Option<RunFailure>,
    /// The `lastRun` snapshot used for every entity query.
    pub watermark: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entities: Vec<EntityReport>,
}

impl SyncRunReport {
    pub fn failed(run_id: Uuid, started_at: DateTime<Utc>, failure: RunFailure) -> Self {
        Self {
            run_id,
            state: RunState::Failed,
            failure: Some(failure),
            watermark: None,
            started_at,
            finished_at: Utc::now(),
            entities: Vec::new(),
        }
    }

    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.entity == name)
    }

    /// True when the run reached `Done` and every entity synced.
    pub fn all_succeeded(&self) -> bool {
        self.state == RunState::Done && self.entities.iter().all(EntityReport::is_success)
    }

    /// Greatest decoded `LastChangeDateTime` across all synced records.
    pub fn max_last_changed(&self) -> Option<DateTime<Utc>> {
        self.entities
            .iter()
            .flat_map(|e| e.records())
            .filter_map(|r| r.last_changed)
            .max()
    }
}
