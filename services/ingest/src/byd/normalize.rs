use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use super::models::{
    NormalizedRecord, RawRecord, CREATION_DATE_TIME, LAST_CHANGE_DATE_TIME, METADATA, OBJECT_ID,
};

/// Why a single record could not be normalized. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("record has no __metadata.type")]
    MissingMetadata,

    #[error("type identifier {0:?} has no second segment")]
    MalformedType(String),
}

/// Convert one raw ByD record into the canonical shape.
pub fn normalize(mut raw: RawRecord, id_attribute: &str) -> Result<NormalizedRecord, NormalizeError> {
    let generic_type = generic_type(&raw)?;
    let generic_id = generic_id(&raw, id_attribute);

    // Exact value comparison: equal raw strings mean the record was never changed.
    let updated = raw.get(CREATION_DATE_TIME) != raw.get(LAST_CHANGE_DATE_TIME);

    let created = decode_field(&raw, CREATION_DATE_TIME);
    let last_changed = decode_field(&raw, LAST_CHANGE_DATE_TIME);
    let date_str = if updated { last_changed } else { created };

    raw.remove(METADATA);
    for key in ["genericId", "genericType", "created", "lastChanged", "updated", "dateStr"] {
        raw.remove(key);
    }

    Ok(NormalizedRecord {
        generic_id,
        generic_type,
        created,
        last_changed,
        updated,
        date_str,
        fields: raw,
    })
}

/// Normalize a page of records, dropping (and logging) the malformed ones.
///
/// Returns the normalized records and the number dropped.
pub fn normalize_batch(raws: Vec<RawRecord>, id_attribute: &str) -> (Vec<NormalizedRecord>, usize) {
    let mut records = Vec::with_capacity(raws.len());
    let mut dropped = 0;

    for raw in raws {
        let object_id = raw
            .get(OBJECT_ID)
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        match normalize(raw, id_attribute) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(object_id = %object_id, id_attribute, error = %e, "dropping malformed record");
                dropped += 1;
            }
        }
    }

    (records, dropped)
}

/// `"ByDOData.Invoice"` -> `"Invoice"`.
fn generic_type(raw: &RawRecord) -> Result<String, NormalizeError> {
    let type_id = raw
        .get(METADATA)
        .and_then(|m| m.get("type"))
        .and_then(Value::as_str)
        .ok_or(NormalizeError::MissingMetadata)?;

    match type_id.split('.').nth(1) {
        Some(segment) if !segment.is_empty() => Ok(segment.to_string()),
        _ => Err(NormalizeError::MalformedType(type_id.to_string())),
    }
}

/// Scalar id rendered as text. Anything else leaves the record without an id.
fn generic_id(raw: &RawRecord, id_attribute: &str) -> Option<String> {
    match raw.get(id_attribute) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        other => {
            let object_id = raw.get(OBJECT_ID).and_then(Value::as_str).unwrap_or("<unknown>");
            tracing::warn!(
                object_id,
                id_attribute,
                found = ?other,
                "record has no usable id, keeping it without one"
            );
            None
        }
    }
}

fn decode_field(raw: &RawRecord, field: &str) -> Option<DateTime<Utc>> {
    let value = raw.get(field)?.as_str()?;
    let decoded = decode_byd_timestamp(value);
    if decoded.is_none() {
        tracing::warn!(field, value, "could not decode byd timestamp");
    }
    decoded
}

/// Decode the OData v2 wrapped epoch `/Date(1600183555000)/`.
///
/// The millis sit between the last `(` and the last `)`; a trailing
/// `+hhmm`/`-hhmm` offset is ignored since the millis are already UTC.
pub fn decode_byd_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let start = value.rfind('(')? + 1;
    let end = value.rfind(')')?;
    let inner = value.get(start..end)?;

    let millis_part = match inner.get(1..).and_then(|rest| rest.find(['+', '-'])) {
        Some(offset_at) => &inner[..offset_at + 1],
        None => inner,
    };

    let millis: i64 = millis_part.parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
