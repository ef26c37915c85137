use bydsync_ingest::runs::RunStatus;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub data: RunStatus,
}
