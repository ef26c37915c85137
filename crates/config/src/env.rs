use bydsync_common::error::{SyncError, SyncResult};
use std::env;

use crate::entity::{entities_from_env, EntityDefinition};

/// Where the `lastRun` watermark lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkBackend {
    Postgres { database_url: String, table: String },
    /// In-process store seeded with a fixed `lastRun`, for local runs.
    Local { last_run: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_id: i64,
    pub watermark: WatermarkBackend,
    pub entities: Vec<EntityDefinition>,
    pub run_deadline_secs: u64,
    /// Finished runs the API keeps queryable before evicting the oldest.
    pub run_retention: usize,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> SyncResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        let config_id = get_var("CONFIG_ID")?
            .parse()
            .map_err(|e| SyncError::Config(format!("invalid CONFIG_ID: {e}")))?;

        let watermark = match env::var("LOCAL_LAST_RUN").ok() {
            Some(last_run) => WatermarkBackend::Local { last_run },
            None => WatermarkBackend::Postgres {
                database_url: get_var("DATABASE_URL")?,
                table: get_var("CONFIG_TABLE")?,
            },
        };

        Ok(Self {
            config_id,
            watermark,
            entities: entities_from_env()?,
            run_deadline_secs: parse_var_or("SYNC_DEADLINE_SECS", 300)?,
            run_retention: positive_var_or("SYNC_RUN_RETENTION", 100)?,
            host: get_var_or("HOST", "0.0.0.0"),
            port: parse_var_or("PORT", 8080)?,
            log_level: get_var_or("LOG_LEVEL", "info"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn get_var(key: &str) -> SyncResult<String> {
    env::var(key).map_err(|_| SyncError::Config(format!("{key} is required but not set")))
}

fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_var_or<T>(key: &str, default: T) -> SyncResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| SyncError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn positive_var_or(key: &str, default: usize) -> SyncResult<usize> {
    match parse_var_or(key, default)? {
        0 => Err(SyncError::Config(format!("{key} must be greater than 0"))),
        n => Ok(n),
    }
}

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
