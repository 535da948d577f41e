use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use crate::{
    validation::{ValidationErrorType, ValidationReport},
    variant::MigrationVariant,
};

/// Renders run summaries and precondition failures
pub struct RunReporter {
    output_format: ReportFormat,
}

/// Available output formats for run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Console,
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    DetectFrameworks,
    ExtractTitles,
    MigrateAll,
    MigrateSpecific,
}

/// Aggregate counts for one pass over the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub operation: Operation,
    pub variant: MigrationVariant,
    pub processed: usize,
    pub skipped: usize,
    /// Number of ids asked for; zero when the whole corpus was targeted
    pub requested: usize,
    pub not_found: Vec<String>,
    pub output: Option<PathBuf>,
    pub written: Vec<PathBuf>,
}

impl RunSummary {
    pub fn new(operation: Operation, variant: MigrationVariant) -> Self {
        Self {
            operation,
            variant,
            processed: 0,
            skipped: 0,
            requested: 0,
            not_found: Vec::new(),
            output: None,
            written: Vec::new(),
        }
    }
}

impl RunReporter {
    pub fn new() -> Self {
        Self {
            output_format: ReportFormat::Console,
        }
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn format_summary(&self, summary: &RunSummary) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_summary(summary)),
            ReportFormat::Json => serde_json::to_string_pretty(summary)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
            ReportFormat::Yaml => serde_yaml::to_string(summary)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
        }
    }

    pub fn format_validation(&self, report: &ValidationReport) -> Result<String, ReportError> {
        match self.output_format {
            ReportFormat::Console => Ok(self.format_console_validation(report)),
            ReportFormat::Json => serde_json::to_string_pretty(report)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
            ReportFormat::Yaml => serde_yaml::to_string(report)
                .map_err(|e| ReportError::SerializationError(e.to_string())),
        }
    }

    fn format_console_summary(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str(&format!("=== {} Complete ===\n", summary.operation));
        output.push_str(&format!("  Variant: {}\n", summary.variant));
        output.push_str(&format!("  Processed: {}\n", summary.processed));
        output.push_str(&format!("  Skipped: {}\n", summary.skipped));

        if let Some(ref path) = summary.output {
            output.push_str(&format!("  ✓ Output: {}\n", path.display()));
        }

        if summary.requested > 0 {
            output.push_str(&format!("  Requested: {}\n", summary.requested));
            if !summary.not_found.is_empty() {
                output.push_str(&format!(
                    "  ⚠ {} requested id(s) not found: {}\n",
                    summary.not_found.len(),
                    summary.not_found.join(", ")
                ));
            }
        }

        output
    }

    fn format_console_validation(&self, report: &ValidationReport) -> String {
        let mut output = String::new();
        output.push_str("=== Precondition Check Failed ===\n");
        output.push_str("  No files were written.\n");

        let groups = [
            (ValidationErrorType::UnnormalizedFramework, "Frameworks missing normalized_framework"),
            (ValidationErrorType::MissingEnrichmentRow, "CEIs missing from the enrichment table"),
            (ValidationErrorType::MissingFindingTitle, "CEIs missing finding_title"),
            (ValidationErrorType::MissingAssessmentId, "CEIs missing assessment_id"),
        ];

        for (error_type, heading) in groups {
            let offending = report.offending(error_type);
            if offending.is_empty() {
                continue;
            }
            output.push_str(&format!("\n{} ({}):\n", heading, offending.len()));
            for subject in offending {
                output.push_str(&format!("  - {}\n", subject));
            }
        }

        if report.has_warnings() {
            output.push_str("\nWarnings:\n");
            for warning in &report.warnings {
                output.push_str(&format!("  • {}\n", warning.message));
            }
        }

        output
    }
}

impl Default for RunReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DetectFrameworks => "Framework Detection",
            Self::ExtractTitles => "Title Extraction",
            Self::MigrateAll => "Migration",
            Self::MigrateSpecific => "Selective Migration",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(Self::Console),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(ReportError::FormatError(format!("unknown report format '{}'", other))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Format error: {0}")]
    FormatError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{ValidationError, ValidationWarning, ValidationWarningType};

    fn summary() -> RunSummary {
        let mut summary = RunSummary::new(Operation::MigrateSpecific, MigrationVariant::Remapped);
        summary.processed = 3;
        summary.skipped = 1;
        summary.requested = 5;
        summary.not_found = vec!["CEI-8".to_string(), "CEI-9".to_string()];
        summary.output = Some(PathBuf::from("New CEIs"));
        summary
    }

    #[test]
    fn test_reporter_creation() {
        let reporter = RunReporter::new();
        assert!(matches!(reporter.output_format, ReportFormat::Console));
    }

    #[test]
    fn test_reporter_with_format() {
        let reporter = RunReporter::new().with_format(ReportFormat::Json);
        assert!(matches!(reporter.output_format, ReportFormat::Json));
    }

    #[test]
    fn test_format_console_summary() {
        let formatted = RunReporter::new().format_summary(&summary()).unwrap();

        assert!(formatted.contains("Selective Migration Complete"));
        assert!(formatted.contains("Processed: 3"));
        assert!(formatted.contains("Skipped: 1"));
        assert!(formatted.contains("2 requested id(s) not found: CEI-8, CEI-9"));
        assert!(formatted.contains("Variant: v3"));
    }

    #[test]
    fn test_format_json_summary() {
        let formatted = RunReporter::new()
            .with_format(ReportFormat::Json)
            .format_summary(&summary())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&formatted).unwrap();

        assert_eq!(parsed["processed"], 3);
        assert_eq!(parsed["operation"], "MigrateSpecific");
        assert_eq!(parsed["not_found"][1], "CEI-9");
    }

    #[test]
    fn test_format_yaml_summary() {
        let formatted = RunReporter::new()
            .with_format(ReportFormat::Yaml)
            .format_summary(&summary())
            .unwrap();
        assert!(formatted.contains("processed: 3"));
    }

    #[test]
    fn test_format_console_validation_lists_every_subject() {
        let mut report = ValidationReport::new();
        for id in ["CEI-1", "CEI-2"] {
            report.add_error(ValidationError::new(
                id.to_string(),
                ValidationErrorType::MissingAssessmentId,
                format!("{} missing", id),
            ));
        }
        report.add_error(ValidationError::new(
            "soc2".to_string(),
            ValidationErrorType::UnnormalizedFramework,
            "soc2 missing".to_string(),
        ));
        report.add_warning(ValidationWarning::new(
            "cis".to_string(),
            ValidationWarningType::UntrackedFramework,
            "cis untracked".to_string(),
        ));

        let formatted = RunReporter::new().format_validation(&report).unwrap();
        assert!(formatted.contains("CEIs missing assessment_id (2)"));
        assert!(formatted.contains("  - CEI-1\n"));
        assert!(formatted.contains("  - CEI-2\n"));
        assert!(formatted.contains("Frameworks missing normalized_framework (1)"));
        assert!(formatted.contains("  - soc2\n"));
        assert!(formatted.contains("cis untracked"));
        assert!(!formatted.contains("finding_title"));
    }

    #[test]
    fn test_report_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("yml".parse::<ReportFormat>().unwrap(), ReportFormat::Yaml);
        assert!("html".parse::<ReportFormat>().is_err());
    }
}
