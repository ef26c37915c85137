use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::watermark::models::WatermarkRecord;
use crate::watermark::repositories::WatermarkRepository;
use bydsync_common::error::{SyncError, SyncResult};

/// In-process watermark store for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryWatermarkRepository {
    records: Arc<RwLock<HashMap<i64, WatermarkRecord>>>,
}

impl MemoryWatermarkRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with one record.
    pub fn seeded(config_id: i64, last_run: &str) -> Self {
        let record = WatermarkRecord {
            config_id,
            last_run: last_run.to_owned(),
            updated_at: Utc::now(),
        };
        Self {
            records: Arc::new(RwLock::new(HashMap::from([(config_id, record)]))),
        }
    }
}

#[async_trait]
impl WatermarkRepository for MemoryWatermarkRepository {
    async fn get(&self, config_id: i64) -> SyncResult<WatermarkRecord> {
        self.records
            .read()
            .await
            .get(&config_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound(format!("no watermark for config_id {config_id}")))
    }

    async fn set(&self, config_id: i64, last_run: &str) -> SyncResult<WatermarkRecord> {
        let record = WatermarkRecord {
            config_id,
            last_run: last_run.to_owned(),
            updated_at: Utc::now(),
        };
        self.records.write().await.insert(config_id, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_returns_not_found() {
        let repo = MemoryWatermarkRepository::new();
        let err = repo.get(0).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn seeded_store_returns_last_run() {
        let repo = MemoryWatermarkRepository::seeded(0, "2020-09-13T09:31:06.393Z");
        let wm = repo.get(0).await.expect("seeded");
        assert_eq!(wm.last_run, "2020-09-13T09:31:06.393Z");
        assert!(repo.get(1).await.is_err());
    }

    #[tokio::test]
    async fn set_is_visible_through_clones() {
        let repo = MemoryWatermarkRepository::new();
        let other = repo.clone();
        repo.set(3, "2020-09-14T00:00:00.000Z").await.expect("set");
        let wm = other.get(3).await.expect("shared state");
        assert_eq!(wm.last_run, "2020-09-14T00:00:00.000Z");
    }
}
