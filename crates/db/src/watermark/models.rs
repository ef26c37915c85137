use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Persisted `lastRun` boundary for one sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    pub config_id: i64,
    /// ISO-8601 with millisecond precision, e.g. `2020-09-13T09:31:06.393Z`.
    pub last_run: String,
    pub updated_at: DateTime<Utc>,
}

/// Render an instant in the watermark wire shape.
pub fn format_watermark(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_watermark_uses_millis_and_z_suffix() {
        let at = Utc.timestamp_millis_opt(1_599_989_466_393).unwrap();
        assert_eq!(format_watermark(at), "2020-09-13T09:31:06.393Z");
    }

    #[test]
    fn format_watermark_pads_zero_millis() {
        let at = Utc.with_ymd_and_hms(2020, 9, 15, 15, 45, 55).unwrap();
        assert_eq!(format_watermark(at), "2020-09-15T15:45:55.000Z");
    }
}
