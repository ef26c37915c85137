use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::watermark::models::WatermarkRecord;
use crate::watermark::repositories::WatermarkRepository;
use bydsync_common::error::{SyncError, SyncResult};

/// Watermark store backed by a Postgres table whose name comes from configuration.
#[derive(Clone)]
pub struct PgWatermarkRepository {
    pool: PgPool,
    table: String,
}

impl PgWatermarkRepository {
    /// `table` may be schema-qualified (`sync.byd_config`); each part must be a
    /// plain identifier since it is spliced into the SQL text.
    pub fn new(pool: PgPool, table: &str) -> SyncResult<Self> {
        if !is_valid_table_name(table) {
            return Err(SyncError::Config(format!(
                "CONFIG_TABLE {table:?} is not a valid table identifier"
            )));
        }
        Ok(Self {
            pool,
            table: table.to_owned(),
        })
    }

    /// Create the backing table if it does not exist.
    pub async fn ensure_table(&self) -> SyncResult<()> {
        sqlx::query(&format!(
            "create table if not exists {} (
               config_id bigint primary key,
               last_run text not null,
               updated_at timestamptz not null default now()
             )",
            self.table
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    fn map_row(row: sqlx::postgres::PgRow) -> SyncResult<WatermarkRecord> {
        Ok(WatermarkRecord {
            config_id: row.get("config_id"),
            last_run: row.get("last_run"),
            updated_at: row.get("updated_at"),
        })
    }
}

fn is_valid_table_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[async_trait]
impl WatermarkRepository for PgWatermarkRepository {
    async fn get(&self, config_id: i64) -> SyncResult<WatermarkRecord> {
        let row = sqlx::query(&format!(
            "select config_id, last_run, updated_at from {} where config_id = $1",
            self.table
        ))
        .bind(config_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(SyncError::NotFound(format!(
                "no watermark for config_id {config_id} in {}",
                self.table
            ))),
        }
    }

    async fn set(&self, config_id: i64, last_run: &str) -> SyncResult<WatermarkRecord> {
        let row = sqlx::query(&format!(
            "insert into {} (config_id, last_run, updated_at)
             values ($1, $2, $3)
             on conflict (config_id) do update set last_run = excluded.last_run, updated_at = excluded.updated_at
             returning config_id, last_run, updated_at",
            self.table
        ))
        .bind(config_id)
        .bind(last_run)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Self::map_row(row)
    }
}
