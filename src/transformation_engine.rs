use serde_json::{Map, Value};
use crate::{
    condition::extract_condition,
    record::{FieldMappingItem, FindingConfigEntry, NewCeiRecord, OldCeiRecord},
    side_table::{EnrichmentMaps, FrameworkMap},
    variant::{FieldSource, MigrationProfile, ValidationStepsSource},
};

/// Fully-qualified table the old scope queries read from
pub const LEGACY_SCOPE_TABLE: &str = "<SCHEMA_PLACEHOLDER>.sds_ei__publish_transformer__entity_inventory";
pub const NEW_SCHEMA_PLACEHOLDER: &str = "<NEW_SCHEMA_PLACEHOLDER>";

/// UI field that only carries the CEI status and never becomes finding evidence
pub const STATUS_FIELD: &str = "cei_status";

pub const RELATIONSHIP_PRIMARY_KEY: &str = "relationship_id";
pub const ENTITY_PRIMARY_KEY: &str = "p_id";

/// Side-table lookups consulted while transforming
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub frameworks: FrameworkMap,
    pub enrichment: EnrichmentMaps,
}

/// Maps old-schema CEI records to new-schema records. Holds no mutable state.
pub struct TransformationEngine {
    profile: MigrationProfile,
    lookups: Lookups,
}

impl TransformationEngine {
    pub fn new(profile: MigrationProfile, lookups: Lookups) -> Self {
        Self { profile, lookups }
    }

    pub fn profile(&self) -> &MigrationProfile {
        &self.profile
    }

    /// Transform one old record into the new schema
    pub fn transform(&self, old: &OldCeiRecord) -> NewCeiRecord {
        let contributing_module = match &self.profile.contributing_module {
            FieldSource::CopyFromRecord => old.contributing_module.clone(),
            FieldSource::Fixed(modules) => modules.iter().cloned().map(Value::String).collect(),
        };

        let exposure_category = match &self.profile.exposure_category {
            FieldSource::CopyFromRecord => old.exposure_category.clone(),
            FieldSource::Fixed(category) => category.clone(),
        };

        NewCeiRecord {
            id: self.resolve_id(old),
            title: old.cei_title.clone(),
            contributing_module,
            is_active: old.is_active.unwrap_or(true),
            description: old.description_text(),
            scope_entity: old.entity.clone(),
            scope_validation_steps: self.validation_steps(old),
            scope_query: rewrite_scope_query(&old.entity, &old.sql_query),
            success_condition: extract_condition(&old.cei_condition),
            finding_primary_key: primary_key_for(&old.entity).to_string(),
            finding_title: self.resolve_finding_title(old),
            finding_config: build_finding_config(old.field_mappings()),
            exposure_category,
            control_mapping: map_controls(
                &old.framework_mapping,
                &self.lookups.frameworks,
                &self.profile.excluded_frameworks,
            ),
        }
    }

    /// New id: the assessment id from the enrichment table when remapping, else the old code
    pub fn resolve_id(&self, old: &OldCeiRecord) -> String {
        if self.profile.remap_ids {
            if let Some(assessment_id) = self
                .lookups
                .enrichment
                .assessment_ids
                .get(&old.cei_code)
                .filter(|id| !id.is_empty())
            {
                return assessment_id.clone();
            }
        }
        old.cei_code.clone()
    }

    /// A side-table entry wins even when blank; absent entries fall back to the record
    fn resolve_finding_title(&self, old: &OldCeiRecord) -> String {
        match self.lookups.enrichment.finding_titles.get(&old.cei_code) {
            Some(title) => title.clone(),
            None => old.finding_title.clone().unwrap_or_default(),
        }
    }

    fn validation_steps(&self, old: &OldCeiRecord) -> Value {
        match self.profile.validation_steps {
            ValidationStepsSource::RawDescription => old
                .cei_description
                .clone()
                .unwrap_or_else(|| Value::Array(Vec::new())),
            ValidationStepsSource::DescriptionList => {
                let description = old.description_text();
                if description.trim().is_empty() {
                    Value::Array(Vec::new())
                } else {
                    Value::Array(vec![Value::String(description)])
                }
            }
        }
    }
}

/// Multi-entity scopes are keyed by relationship, single-entity scopes by entity id
pub fn primary_key_for(entities: &[String]) -> &'static str {
    if entities.len() > 1 {
        RELATIONSHIP_PRIMARY_KEY
    } else {
        ENTITY_PRIMARY_KEY
    }
}

/// Point single-entity queries at that entity's enrich table
pub fn rewrite_scope_query(entities: &[String], query: &str) -> String {
    match entities {
        [entity] if !query.is_empty() => {
            let table = format!(
                "{}.sds_ei__{}__enrich",
                NEW_SCHEMA_PLACEHOLDER,
                entity.to_lowercase()
            );
            query.replace(LEGACY_SCOPE_TABLE, &table)
        }
        _ => query.to_string(),
    }
}

/// Evidence descriptors from the UI field mapping, in source order.
/// Never empty: falls back to a single blank entry.
pub fn build_finding_config(items: &[FieldMappingItem]) -> Vec<FindingConfigEntry> {
    let entries: Vec<FindingConfigEntry> = items
        .iter()
        .filter(|item| item.data_field != STATUS_FIELD)
        .map(|item| {
            FindingConfigEntry::new(item.data_label.clone().unwrap_or_default(), item.data_field.clone())
        })
        .collect();

    if entries.is_empty() {
        return vec![FindingConfigEntry::default()];
    }
    entries
}

/// Rebuild the framework mapping under normalized framework names.
///
/// Excluded frameworks are dropped. Control-id lists are uppercased;
/// non-string list elements and scalar values are kept as they are.
pub fn map_controls(mapping: &Value, frameworks: &FrameworkMap, excluded: &[String]) -> Map<String, Value> {
    let mut controls = Map::new();
    let Value::Object(source) = mapping else {
        return controls;
    };

    for (framework, value) in source {
        let framework = framework.trim();
        if excluded.iter().any(|e| e == framework) {
            continue;
        }

        let key = frameworks
            .get(framework)
            .filter(|normalized| !normalized.is_empty())
            .map_or(framework, String::as_str)
            .to_string();

        let value = match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(control) => Value::String(control.to_uppercase()),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            scalar => scalar.clone(),
        };

        controls.insert(key, value);
    }

    controls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::MigrationVariant;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn old(value: Value) -> OldCeiRecord {
        OldCeiRecord::from_value(value).unwrap()
    }

    fn lookups() -> Lookups {
        let mut lookups = Lookups::default();
        lookups.frameworks.insert("pci_dss_v4".to_string(), "PCI DSS 4.0".to_string());
        lookups.frameworks.insert("soc2".to_string(), String::new());
        lookups.enrichment.finding_titles.insert("CEI-001".to_string(), "Curated finding".to_string());
        lookups.enrichment.assessment_ids.insert("CEI-001".to_string(), "ASM-100".to_string());
        lookups.enrichment.finding_titles.insert("CEI-002".to_string(), String::new());
        lookups.enrichment.assessment_ids.insert("CEI-002".to_string(), String::new());
        lookups
    }

    fn sample_record() -> Value {
        json!({
            "cei_code": "CEI-001",
            "cei_title": "Stale privileged accounts",
            "description": "Privileged accounts unused for 90 days",
            "entity": ["User"],
            "sql_query": "SELECT * FROM <SCHEMA_PLACEHOLDER>.sds_ei__publish_transformer__entity_inventory WHERE x",
            "cei_condition": "CASE WHEN days_inactive > 90 THEN 'FAIL' ELSE 'PASS' END",
            "finding_title": "Own finding",
            "exposure_category": "Identity",
            "contributing_module": ["IAM"],
            "framework_mapping": {
                "pci_dss_v4": ["ac-1", "ac-2"],
                "nist_csf_v1": ["pr.ac-1"],
                "soc2": "cc6.1"
            },
            "ui_config": {
                "field_mapping": [
                    { "data_field": "user_name", "data_label": "User" },
                    { "data_field": "cei_status", "data_label": "Status" },
                    { "data_field": "last_login" }
                ]
            }
        })
    }

    #[test]
    fn test_transform_remapped_record() {
        let engine = TransformationEngine::new(MigrationVariant::Remapped.profile(), lookups());
        let record = engine.transform(&old(sample_record()));

        assert_eq!(record.id, "ASM-100");
        assert_eq!(record.title, "Stale privileged accounts");
        assert_eq!(record.contributing_module, vec![json!("CCM")]);
        assert!(record.is_active);
        assert_eq!(record.scope_entity, vec!["User".to_string()]);
        assert_eq!(
            record.scope_validation_steps,
            json!(["Privileged accounts unused for 90 days"])
        );
        assert_eq!(
            record.scope_query,
            "SELECT * FROM <NEW_SCHEMA_PLACEHOLDER>.sds_ei__user__enrich WHERE x"
        );
        assert_eq!(record.success_condition, "days_inactive > 90");
        assert_eq!(record.finding_primary_key, "p_id");
        assert_eq!(record.finding_title, "Curated finding");
        assert_eq!(record.exposure_category, "Control Gap");
        assert_eq!(
            record.finding_config,
            vec![
                FindingConfigEntry::new("User", "user_name"),
                FindingConfigEntry::new("", "last_login"),
            ]
        );
        assert_eq!(
            Value::Object(record.control_mapping),
            json!({ "PCI DSS 4.0": ["AC-1", "AC-2"], "soc2": "cc6.1" })
        );
    }

    #[test]
    fn test_transform_legacy_copies_configured_fields() {
        let engine = TransformationEngine::new(MigrationVariant::Legacy.profile(), Lookups::default());
        let mut source = sample_record();
        source["cei_description"] = json!(["step one", "step two"]);
        let record = engine.transform(&old(source));

        assert_eq!(record.id, "CEI-001");
        assert_eq!(record.contributing_module, vec![json!("IAM")]);
        assert_eq!(record.exposure_category, "Identity");
        assert_eq!(record.finding_title, "Own finding");
        assert_eq!(record.scope_validation_steps, json!(["step one", "step two"]));
        assert!(record.control_mapping.contains_key("nist_csf_v1"));
    }

    #[test]
    fn test_blank_side_table_entries() {
        let engine = TransformationEngine::new(MigrationVariant::Remapped.profile(), lookups());
        let mut source = sample_record();
        source["cei_code"] = json!("CEI-002");
        let record = engine.transform(&old(source));

        // blank assessment id keeps the old code, blank finding title still wins
        assert_eq!(record.id, "CEI-002");
        assert_eq!(record.finding_title, "");
    }

    #[test]
    fn test_finding_title_falls_back_to_record() {
        let engine = TransformationEngine::new(MigrationVariant::Enriched.profile(), lookups());
        let mut source = sample_record();
        source["cei_code"] = json!("CEI-404");
        let record = engine.transform(&old(source));
        assert_eq!(record.finding_title, "Own finding");

        let bare = engine.transform(&old(json!({ "cei_code": "CEI-405" })));
        assert_eq!(bare.finding_title, "");
        assert_eq!(bare.scope_validation_steps, json!([]));
        assert_eq!(bare.finding_config, vec![FindingConfigEntry::default()]);
        assert!(bare.control_mapping.is_empty());
    }

    #[test]
    fn test_is_active_respected() {
        let engine = TransformationEngine::new(MigrationVariant::Legacy.profile(), Lookups::default());
        let record = engine.transform(&old(json!({ "cei_code": "CEI-9", "is_active": false })));
        assert!(!record.is_active);
    }

    #[test]
    fn test_primary_key_rule() {
        let none: Vec<String> = Vec::new();
        let one = vec!["User".to_string()];
        let two = vec!["User".to_string(), "Role".to_string()];

        assert_eq!(primary_key_for(&none), "p_id");
        assert_eq!(primary_key_for(&one), "p_id");
        assert_eq!(primary_key_for(&two), "relationship_id");
    }

    #[test]
    fn test_scope_query_only_rewritten_for_single_entity() {
        let query = format!("SELECT id FROM {}", LEGACY_SCOPE_TABLE);
        let two = vec!["User".to_string(), "Role".to_string()];
        assert_eq!(rewrite_scope_query(&two, &query), query);

        let one = vec!["CloudAccount".to_string()];
        assert_eq!(
            rewrite_scope_query(&one, &query),
            "SELECT id FROM <NEW_SCHEMA_PLACEHOLDER>.sds_ei__cloudaccount__enrich"
        );
        assert_eq!(rewrite_scope_query(&one, ""), "");
        assert_eq!(rewrite_scope_query(&one, "SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_finding_config_skips_status_field() {
        let items = vec![
            FieldMappingItem {
                data_field: "cei_status".to_string(),
                data_label: Some("Status".to_string()),
            },
            FieldMappingItem {
                data_field: "host_name".to_string(),
                data_label: Some("Host".to_string()),
            },
        ];

        assert_eq!(build_finding_config(&items), vec![FindingConfigEntry::new("Host", "host_name")]);
        assert_eq!(build_finding_config(&[]), vec![FindingConfigEntry::new("", "")]);
    }

    #[test]
    fn test_map_controls_rules() {
        let mut frameworks = FrameworkMap::new();
        frameworks.insert("iso".to_string(), "ISO 27001".to_string());
        frameworks.insert("iso_2013".to_string(), "ISO 27001".to_string());
        let excluded = vec!["scf_2023_2".to_string()];

        let mapping = json!({
            "iso": ["a.5", 7, null],
            "scf_2023_2": ["x-1"],
            "scf_2023_4": ["gov-01"],
            "cis": 8,
            "iso_2013": ["a.6"]
        });

        let controls = map_controls(&mapping, &frameworks, &excluded);
        let keys: Vec<&str> = controls.keys().map(String::as_str).collect();

        assert_eq!(keys, vec!["ISO 27001", "scf_2023_4", "cis"]);
        assert_eq!(controls["ISO 27001"], json!(["A.6"]));
        assert_eq!(controls["scf_2023_4"], json!(["GOV-01"]));
        assert_eq!(controls["cis"], json!(8));
        assert!(!controls.contains_key("scf_2023_2"));
    }

    #[test]
    fn test_finding_config_status_only_falls_back_to_default() {
        let items = vec![FieldMappingItem {
            data_field: "cei_status".to_string(),
            data_label: Some("Status".to_string()),
        }];

        assert_eq!(build_finding_config(&items), vec![FindingConfigEntry::default()]);
    }

    #[test]
    fn test_map_controls_trims_framework_keys() {
        let mut frameworks = FrameworkMap::new();
        frameworks.insert("pci".to_string(), "PCI DSS".to_string());
        let excluded = vec!["nist_csf_v1".to_string()];

        let controls = map_controls(
            &json!({ " pci ": ["8.1"], "nist_csf_v1 ": ["pr.ac-1"], " cis": 8 }),
            &frameworks,
            &excluded,
        );
        let keys: Vec<&str> = controls.keys().map(String::as_str).collect();

        assert_eq!(keys, vec!["PCI DSS", "cis"]);
    }

    #[test]
    fn test_map_controls_keeps_non_string_elements() {
        let controls = map_controls(&json!({ "iso": ["a.5", 7, null] }), &FrameworkMap::new(), &[]);
        assert_eq!(controls["iso"], json!(["A.5", 7, null]));
    }

    #[test]
    fn test_map_controls_non_object() {
        assert!(map_controls(&json!(["a"]), &FrameworkMap::new(), &[]).is_empty());
        assert!(map_controls(&Value::Null, &FrameworkMap::new(), &[]).is_empty());
    }
}
