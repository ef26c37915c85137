use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One record exactly as ByD returns it.
pub type RawRecord = Map<String, Value>;

pub const OBJECT_ID: &str = "ObjectID";
pub const CREATION_DATE_TIME: &str = "CreationDateTime";
pub const LAST_CHANGE_DATE_TIME: &str = "LastChangeDateTime";
pub const METADATA: &str = "__metadata";

/// OData v2 JSON envelope: `{ "d": { "results": [...], "__next": "..." } }`.
#[derive(Debug, Deserialize)]
pub struct ODataEnvelope {
    pub d: ODataResults,
}

#[derive(Debug, Deserialize)]
pub struct ODataResults {
    pub results: Vec<RawRecord>,
    #[serde(rename = "__next", default)]
    pub next: Option<String>,
}

/// Entity-agnostic shape of a synchronized record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    /// `None` when the id attribute is absent or not a scalar.
    pub generic_id: Option<String>,
    pub generic_type: String,
    #[serde(with = "iso_millis")]
    pub created: Option<DateTime<Utc>>,
    #[serde(with = "iso_millis")]
    pub last_changed: Option<DateTime<Utc>>,
    pub updated: bool,
    /// Effective change time: `last_changed` when updated, else `created`.
    #[serde(with = "iso_millis")]
    pub date_str: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Optional timestamps as `2020-09-15T15:25:55.000Z`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn deserialize_envelope_with_next_link() {
        let json = r#"{
            "d": {
                "results": [
                    {"__metadata": {"type": "ByDOData.Invoice"}, "ID": "100"}
                ],
                "__next": "https://my.byd.example/odata/CustomerInvoiceCollection?$skiptoken=1"
            }
        }"#;
        let envelope: ODataEnvelope = serde_json::from_str(json).expect("should deserialize");
        assert_eq!(envelope.d.results.len(), 1);
        assert_eq!(envelope.d.results[0]["ID"], "100");
        assert!(envelope.d.next.unwrap().ends_with("$skiptoken=1"));
    }

    #[test]
    fn deserialize_envelope_without_next_link() {
        let json = r#"{"d": {"results": []}}"#;
        let envelope: ODataEnvelope = serde_json::from_str(json).expect("should deserialize");
        assert!(envelope.d.results.is_empty());
        assert!(envelope.d.next.is_none());
    }

    #[test]
    fn envelope_without_d_is_rejected() {
        let json = r#"{"value": []}"#;
        assert!(serde_json::from_str::<ODataEnvelope>(json).is_err());
    }

    #[test]
    fn normalized_record_serializes_camel_case_with_passthrough() {
        let mut fields = Map::new();
        fields.insert("ID".to_string(), Value::from("100"));
        let record = NormalizedRecord {
            generic_id: Some("100".to_string()),
            generic_type: "Invoice".to_string(),
            created: Some(Utc.timestamp_millis_opt(1_600_183_555_000).unwrap()),
            last_changed: None,
            updated: false,
            date_str: Some(Utc.timestamp_millis_opt(1_600_183_555_000).unwrap()),
            fields,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["genericId"], "100");
        assert_eq!(json["genericType"], "Invoice");
        assert_eq!(json["updated"], false);
        assert_eq!(json["dateStr"], "2020-09-15T15:25:55.000Z");
        assert_eq!(json["created"], "2020-09-15T15:25:55.000Z");
        assert!(json["lastChanged"].is_null());
        assert_eq!(json["ID"], "100");
    }
}
