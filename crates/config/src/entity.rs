use bydsync_common::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::env;

/// Static descriptor of one ByD entity type (e.g. invoices, customers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    /// Label used in logs and run reports.
    pub name: String,
    /// Resource path relative to the OData base URL.
    pub endpoint: String,
    /// Native identifier field of the source collection.
    pub id_attribute: String,
    #[serde(default)]
    pub additional_attributes: Vec<String>,
}

impl EntityDefinition {
    pub fn new(name: &str, endpoint: &str, id_attribute: &str) -> Self {
        Self {
            name: name.to_owned(),
            endpoint: endpoint.to_owned(),
            id_attribute: id_attribute.to_owned(),
            additional_attributes: Vec::new(),
        }
    }

    pub fn with_additional_attributes(mut self, attributes: Vec<String>) -> Self {
        self.additional_attributes = attributes;
        self
    }

    /// Read one entity from `<PREFIX>` (endpoint), `<PREFIX>_ID` (id attribute)
    /// and the optional `<PREFIX>_SELECT` (comma-separated extra fields).
    ///
    /// Returns `Ok(None)` when the endpoint var is unset. An endpoint without
    /// an id attribute is a misconfiguration.
    pub fn from_env(name: &str, prefix: &str) -> SyncResult<Option<Self>> {
        let endpoint = match non_empty_var(prefix) {
            Some(v) => v,
            None => return Ok(None),
        };

        let id_key = format!("{prefix}_ID");
        let id_attribute = non_empty_var(&id_key).ok_or_else(|| {
            SyncError::Config(format!("{id_key} is required when {prefix} is set"))
        })?;

        let additional = non_empty_var(&format!("{prefix}_SELECT"))
            .map(|raw| parse_csv(&raw))
            .unwrap_or_default();

        Ok(Some(
            Self::new(name, &endpoint, &id_attribute).with_additional_attributes(additional),
        ))
    }
}

/// Entities known to the sync, in report order.
const ENTITY_PREFIXES: &[(&str, &str)] = &[("Invoices", "BYD_INVOICES"), ("Customers", "BYD_CUSTOMERS")];

/// Load every configured entity. At least one must be present.
pub fn entities_from_env() -> SyncResult<Vec<EntityDefinition>> {
    let mut entities = Vec::new();
    for (name, prefix) in ENTITY_PREFIXES {
        if let Some(entity) = EntityDefinition::from_env(name, prefix)? {
            entities.push(entity);
        }
    }

    if entities.is_empty() {
        return Err(SyncError::Config(
            "no entity configured: set BYD_INVOICES and/or BYD_CUSTOMERS".to_string(),
        ));
    }

    Ok(entities)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
