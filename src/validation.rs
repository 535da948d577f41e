use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use thiserror::Error;
use crate::{
    record::OldCeiRecord,
    transformation_engine::Lookups,
    variant::MigrationProfile,
};

/// Outcome of the pre-migration checks over a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Subjects (framework names or CEI ids) of every error of the given type
    pub fn offending(&self, error_type: ValidationErrorType) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.error_type == error_type)
            .map(|e| e.subject.as_str())
            .collect()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// A failed precondition for one framework or CEI id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub subject: String,
    pub error_type: ValidationErrorType,
    pub message: String,
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorType {
    UnnormalizedFramework,
    MissingEnrichmentRow,
    MissingFindingTitle,
    MissingAssessmentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub subject: String,
    pub warning_type: ValidationWarningType,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarningType {
    /// A record maps to a framework the normalization table has never seen
    UntrackedFramework,
}

impl ValidationError {
    pub fn new(subject: String, error_type: ValidationErrorType, message: String) -> Self {
        Self {
            subject,
            error_type,
            message,
            suggested_fix: None,
        }
    }

    pub fn with_suggested_fix(mut self, fix: String) -> Self {
        self.suggested_fix = Some(fix);
        self
    }
}

impl ValidationWarning {
    pub fn new(subject: String, warning_type: ValidationWarningType, message: String) -> Self {
        Self {
            subject,
            warning_type,
            message,
        }
    }
}

/// Check the side tables cover every record targeted by this batch.
///
/// Every problem is collected; nothing short-circuits.
pub fn validate_preconditions(
    profile: &MigrationProfile,
    lookups: &Lookups,
    targets: &[&OldCeiRecord],
) -> ValidationReport {
    let mut report = ValidationReport::new();

    if profile.require_normalized_frameworks {
        for (framework, normalized) in &lookups.frameworks {
            if profile.is_excluded(framework) || !normalized.trim().is_empty() {
                continue;
            }
            report.add_error(
                ValidationError::new(
                    framework.clone(),
                    ValidationErrorType::UnnormalizedFramework,
                    format!("Framework '{}' has no normalized_framework value", framework),
                )
                .with_suggested_fix("Fill in normalized_framework in the framework table".to_string()),
            );
        }

        let untracked: BTreeSet<String> = targets
            .iter()
            .flat_map(|record| record.framework_names())
            .filter(|framework| !profile.is_excluded(framework) && !lookups.frameworks.contains_key(framework))
            .collect();
        for framework in untracked {
            report.add_warning(ValidationWarning::new(
                framework.clone(),
                ValidationWarningType::UntrackedFramework,
                format!("Framework '{}' is not in the framework table and will keep its raw name", framework),
            ));
        }
    }

    if profile.require_finding_titles || profile.remap_ids {
        let ids: BTreeSet<&str> = targets.iter().map(|record| record.cei_code.as_str()).collect();
        let enrichment = &lookups.enrichment;

        for id in ids {
            if !enrichment.contains(id) {
                report.add_error(
                    ValidationError::new(
                        id.to_string(),
                        ValidationErrorType::MissingEnrichmentRow,
                        format!("CEI '{}' has no row in the enrichment table", id),
                    )
                    .with_suggested_fix("Re-run title extraction and curate the new row".to_string()),
                );
                continue;
            }

            let blank = |map: &std::collections::BTreeMap<String, String>| {
                map.get(id).map_or(true, |value| value.trim().is_empty())
            };

            if profile.require_finding_titles && blank(&enrichment.finding_titles) {
                report.add_error(ValidationError::new(
                    id.to_string(),
                    ValidationErrorType::MissingFindingTitle,
                    format!("CEI '{}' has an empty finding_title", id),
                ));
            }
            if profile.remap_ids && blank(&enrichment.assessment_ids) {
                report.add_error(ValidationError::new(
                    id.to_string(),
                    ValidationErrorType::MissingAssessmentId,
                    format!("CEI '{}' has an empty assessment_id", id),
                ));
            }
        }
    }

    report
}

#[derive(Debug, Error)]
pub enum ValidationSetupError {
    #[error("Failed to compile record schema: {0}")]
    InvalidSchema(String),
}

/// JSON Schema gate that input records must pass before entering a batch
pub struct PresenceCheck {
    schema: JSONSchema,
}

impl PresenceCheck {
    /// Old records need a non-empty string `cei_code`; everything else is optional
    pub fn for_old_records() -> Result<Self, ValidationSetupError> {
        Self::compile(&json!({
            "type": "object",
            "required": ["cei_code"],
            "properties": {
                "cei_code": { "type": "string", "minLength": 1 }
            }
        }))
    }

    pub fn compile(schema: &Value) -> Result<Self, ValidationSetupError> {
        let schema = JSONSchema::compile(schema)
            .map_err(|e| ValidationSetupError::InvalidSchema(e.to_string()))?;
        Ok(Self { schema })
    }

    /// Returns one message per violation
    pub fn check(&self, instance: &Value) -> Result<(), Vec<String>> {
        if let Err(errors) = self.schema.validate(instance) {
            let messages = errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect();
            return Err(messages);
        }
        Ok(())
    }
}
