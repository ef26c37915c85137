use bydsync_config::EntityDefinition;

use super::models::{CREATION_DATE_TIME, LAST_CHANGE_DATE_TIME, OBJECT_ID};

/// Source query for records changed at or after a watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaQuery {
    pub entity: String,
    pub endpoint: String,
    pub select: Vec<String>,
    pub filter: String,
}

impl DeltaQuery {
    /// OData system query options, unencoded. The HTTP client percent-encodes
    /// them, so the quotes in `$filter` go out as `%27`.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("$format", "json".to_string()),
            ("$select", self.select.join(",")),
            ("$filter", self.filter.clone()),
        ]
    }
}

/// Build the delta query for one entity.
///
/// Generates: `$select=ID,ObjectID,CreationDateTime,LastChangeDateTime` and
/// `$filter=LastChangeDateTime ge datetimeoffset'2020-09-13T09:31:06.393Z'`
pub fn build_delta_query(entity: &EntityDefinition, watermark: &str) -> DeltaQuery {
    DeltaQuery {
        entity: entity.name.clone(),
        endpoint: entity.endpoint.clone(),
        select: select_fields(entity),
        filter: format!(
            "{LAST_CHANGE_DATE_TIME} ge datetimeoffset{}",
            quote_literal(watermark)
        ),
    }
}

/// Id attribute first, then the change-tracking fields, then extras. Duplicates dropped.
fn select_fields(entity: &EntityDefinition) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let base = [
        entity.id_attribute.as_str(),
        OBJECT_ID,
        CREATION_DATE_TIME,
        LAST_CHANGE_DATE_TIME,
    ];
    for field in base
        .into_iter()
        .chain(entity.additional_attributes.iter().map(String::as_str))
    {
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }
    fields
}

/// OData string literal: single quotes, embedded quotes doubled.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
