use async_trait::async_trait;

use crate::watermark::models::WatermarkRecord;
use bydsync_common::error::SyncResult;

#[async_trait]
pub trait WatermarkRepository: Send + Sync {
    /// Read the watermark for a configuration id.
    /// Returns `SyncError::NotFound` when no record exists.
    async fn get(&self, config_id: i64) -> SyncResult<WatermarkRecord>;

    /// Store a new `last_run` for a configuration id, creating the record if needed.
    async fn set(&self, config_id: i64, last_run: &str) -> SyncResult<WatermarkRecord>;
}

#[async_trait]
impl<T> WatermarkRepository for std::sync::Arc<T>
where
    T: WatermarkRepository + ?Sized,
{
    async fn get(&self, config_id: i64) -> SyncResult<WatermarkRecord> {
        (**self).get(config_id).await
    }

    async fn set(&self, config_id: i64, last_run: &str) -> SyncResult<WatermarkRecord> {
        (**self).set(config_id, last_run).await
    }
}
