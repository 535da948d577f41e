use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// CEI definition in the old schema, as read from one input file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct OldCeiRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub cei_code: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cei_title: String,
    pub description: Option<String>,
    /// Either free text or a list of steps, depending on when the record was authored
    pub cei_description: Option<Value>,
    #[serde(deserialize_with = "null_as_default")]
    pub contributing_module: Vec<Value>,
    pub is_active: Option<bool>,
    #[serde(deserialize_with = "null_as_default")]
    pub entity: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub sql_query: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cei_condition: String,
    pub finding_title: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub exposure_category: String,
    pub framework_mapping: Value,
    pub ui_config: Option<UiConfig>,
}

/// Display configuration attached to an old record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    #[serde(alias = "fields_mapping")]
    pub field_mapping: Option<Vec<FieldMappingItem>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldMappingItem {
    #[serde(deserialize_with = "null_as_default")]
    pub data_field: String,
    pub data_label: Option<String>,
}

impl OldCeiRecord {
    /// Parse an old record from its JSON value
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// `description`, falling back to `cei_description` when that is plain text
    pub fn description_text(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match &self.cei_description {
            Some(Value::String(text)) => text.clone(),
            _ => String::new(),
        }
    }

    /// Trimmed framework names in the order they appear in `framework_mapping`
    pub fn framework_names(&self) -> Vec<String> {
        match &self.framework_mapping {
            Value::Object(map) => map.keys().map(|key| key.trim().to_string()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn field_mappings(&self) -> &[FieldMappingItem] {
        self.ui_config
            .as_ref()
            .and_then(|ui| ui.field_mapping.as_deref())
            .unwrap_or(&[])
    }
}

/// CEI definition in the new schema. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCeiRecord {
    pub id: String,
    pub title: String,
    pub contributing_module: Vec<Value>,
    pub is_active: bool,
    pub description: String,
    pub scope_entity: Vec<String>,
    pub scope_validation_steps: Value,
    pub scope_query: String,
    pub success_condition: String,
    pub finding_primary_key: String,
    pub finding_title: String,
    pub finding_config: Vec<FindingConfigEntry>,
    pub exposure_category: String,
    pub control_mapping: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingConfigEntry {
    pub title: String,
    pub expression: String,
    pub finding_evidence: bool,
}

impl FindingConfigEntry {
    pub fn new(title: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            expression: expression.into(),
            finding_evidence: true,
        }
    }
}

impl Default for FindingConfigEntry {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_old_record_defaults_for_missing_fields() {
        let record = OldCeiRecord::from_value(json!({ "cei_code": "CEI-001" })).unwrap();

        assert_eq!(record.cei_code, "CEI-001");
        assert!(record.entity.is_empty());
        assert!(record.is_active.is_none());
        assert!(record.field_mappings().is_empty());
        assert!(record.framework_names().is_empty());
    }

    #[test]
    fn test_old_record_rejects_wrong_shape() {
        let result = OldCeiRecord::from_value(json!({ "cei_code": "CEI-001", "entity": "User" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_old_record_null_fields_use_defaults() {
        let record = OldCeiRecord::from_value(json!({
            "cei_code": "CEI-001",
            "cei_title": null,
            "sql_query": null,
            "entity": null,
            "contributing_module": null,
            "exposure_category": null,
            "ui_config": { "field_mapping": [{ "data_field": null, "data_label": "Host" }] }
        }))
        .unwrap();

        assert_eq!(record.cei_title, "");
        assert_eq!(record.sql_query, "");
        assert!(record.entity.is_empty());
        assert!(record.contributing_module.is_empty());
        assert_eq!(record.field_mappings()[0].data_field, "");
    }

    #[test]
    fn test_framework_names_are_trimmed() {
        let record = OldCeiRecord::from_value(json!({
            "framework_mapping": { " pci ": ["8.1"], "iso\t": ["A.5"] }
        }))
        .unwrap();

        assert_eq!(record.framework_names(), vec!["pci", "iso"]);
    }

    #[test]
    fn test_description_fallback() {
        let with_description = OldCeiRecord::from_value(json!({
            "description": "primary",
            "cei_description": "secondary"
        }))
        .unwrap();
        assert_eq!(with_description.description_text(), "primary");

        let fallback = OldCeiRecord::from_value(json!({ "cei_description": "secondary" })).unwrap();
        assert_eq!(fallback.description_text(), "secondary");

        let list = OldCeiRecord::from_value(json!({ "cei_description": ["a", "b"] })).unwrap();
        assert_eq!(list.description_text(), "");
    }

    #[test]
    fn test_field_mapping_legacy_key() {
        let record = OldCeiRecord::from_value(json!({
            "ui_config": {
                "fields_mapping": [{ "data_field": "host", "data_label": "Host" }]
            }
        }))
        .unwrap();

        assert_eq!(record.field_mappings().len(), 1);
        assert_eq!(record.field_mappings()[0].data_field, "host");
    }

    #[test]
    fn test_framework_names_keep_source_order() {
        let record = OldCeiRecord::from_value(json!({
            "framework_mapping": { "pci_dss": ["1.1"], "iso_27001": ["A.5"], "cis": 3 }
        }))
        .unwrap();

        assert_eq!(record.framework_names(), vec!["pci_dss", "iso_27001", "cis"]);
    }

    #[test]
    fn test_new_record_serializes_in_field_order() {
        let record = NewCeiRecord {
            id: "CEI-001".to_string(),
            title: "t".to_string(),
            contributing_module: vec![json!("CCM")],
            is_active: true,
            description: String::new(),
            scope_entity: vec!["User".to_string()],
            scope_validation_steps: json!([]),
            scope_query: String::new(),
            success_condition: String::new(),
            finding_primary_key: "p_id".to_string(),
            finding_title: String::new(),
            finding_config: vec![FindingConfigEntry::default()],
            exposure_category: String::new(),
            control_mapping: Map::new(),
        };

        let text = serde_json::to_string(&record).unwrap();
        let id_pos = text.find("\"id\"").unwrap();
        let mapping_pos = text.find("\"control_mapping\"").unwrap();
        assert!(id_pos < mapping_pos);
        assert!(text.contains("\"finding_evidence\":true"));
    }
}
