use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_CONTRIBUTING_MODULE: &str = "CCM";
pub const DEFAULT_EXPOSURE_CATEGORY: &str = "Control Gap";

/// Generation of the migration rules to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MigrationVariant {
    /// Straight field renames, no side tables
    Legacy,
    /// Fixed contributing module, curated finding titles and framework names
    Enriched,
    /// Enriched, plus assessment-id remapping and id-keyed output files
    Remapped,
}

/// How a new-record field is populated for a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSource<T> {
    CopyFromRecord,
    Fixed(T),
}

/// What `scope_validation_steps` carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStepsSource {
    /// The old `cei_description` value as-is, `[]` when absent
    RawDescription,
    /// A one-element list holding the description text, `[]` when blank
    DescriptionList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputNaming {
    SourceFileName,
    NewId,
}

/// Per-batch configuration choices derived from a [`MigrationVariant`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationProfile {
    pub variant: MigrationVariant,
    pub contributing_module: FieldSource<Vec<String>>,
    pub exposure_category: FieldSource<String>,
    pub excluded_frameworks: Vec<String>,
    pub remap_ids: bool,
    pub output_naming: OutputNaming,
    pub validation_steps: ValidationStepsSource,
    pub require_normalized_frameworks: bool,
    pub require_finding_titles: bool,
}

impl MigrationVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "v1",
            Self::Enriched => "v2",
            Self::Remapped => "v3",
        }
    }

    /// Profile for this variant using the default fixed literals
    pub fn profile(&self) -> MigrationProfile {
        self.profile_with(DEFAULT_CONTRIBUTING_MODULE, DEFAULT_EXPOSURE_CATEGORY)
    }

    pub fn profile_with(&self, contributing_module: &str, exposure_category: &str) -> MigrationProfile {
        let fixed_module = FieldSource::Fixed(vec![contributing_module.to_string()]);

        match self {
            Self::Legacy => MigrationProfile {
                variant: *self,
                contributing_module: FieldSource::CopyFromRecord,
                exposure_category: FieldSource::CopyFromRecord,
                excluded_frameworks: Vec::new(),
                remap_ids: false,
                output_naming: OutputNaming::SourceFileName,
                validation_steps: ValidationStepsSource::RawDescription,
                require_normalized_frameworks: false,
                require_finding_titles: false,
            },
            Self::Enriched => MigrationProfile {
                variant: *self,
                contributing_module: fixed_module,
                exposure_category: FieldSource::CopyFromRecord,
                excluded_frameworks: vec!["scf_2023_2".to_string()],
                remap_ids: false,
                output_naming: OutputNaming::SourceFileName,
                validation_steps: ValidationStepsSource::DescriptionList,
                require_normalized_frameworks: true,
                require_finding_titles: true,
            },
            Self::Remapped => MigrationProfile {
                variant: *self,
                contributing_module: fixed_module,
                exposure_category: FieldSource::Fixed(exposure_category.to_string()),
                excluded_frameworks: vec!["nist_csf_v1".to_string(), "scf_2023_2".to_string()],
                remap_ids: true,
                output_naming: OutputNaming::NewId,
                validation_steps: ValidationStepsSource::DescriptionList,
                require_normalized_frameworks: true,
                require_finding_titles: true,
            },
        }
    }
}

impl Default for MigrationVariant {
    fn default() -> Self {
        Self::Remapped
    }
}

impl MigrationProfile {
    pub fn is_excluded(&self, framework: &str) -> bool {
        self.excluded_frameworks.iter().any(|excluded| excluded == framework)
    }

    /// Whether any precondition has to hold before this batch writes output
    pub fn has_preconditions(&self) -> bool {
        self.require_normalized_frameworks || self.require_finding_titles || self.remap_ids
    }
}

impl fmt::Display for MigrationVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MigrationVariant {
    type Err = VariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" | "legacy" => Ok(Self::Legacy),
            "v2" | "2" | "enriched" => Ok(Self::Enriched),
            "v3" | "3" | "remapped" => Ok(Self::Remapped),
            _ => Err(VariantError::Unknown(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("Unknown migration variant '{0}'. Expected one of: v1, v2, v3")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_display() {
        assert_eq!(MigrationVariant::Legacy.to_string(), "v1");
        assert_eq!(MigrationVariant::Remapped.to_string(), "v3");
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("v2".parse::<MigrationVariant>().unwrap(), MigrationVariant::Enriched);
        assert_eq!(" Remapped ".parse::<MigrationVariant>().unwrap(), MigrationVariant::Remapped);
        assert_eq!("1".parse::<MigrationVariant>().unwrap(), MigrationVariant::Legacy);
    }

    #[test]
    fn test_invalid_variant() {
        assert!("v4".parse::<MigrationVariant>().is_err());
        assert!("".parse::<MigrationVariant>().is_err());
    }

    #[test]
    fn test_variant_ordering() {
        assert!(MigrationVariant::Legacy < MigrationVariant::Enriched);
        assert!(MigrationVariant::Enriched < MigrationVariant::Remapped);
        assert_eq!(MigrationVariant::default(), MigrationVariant::Remapped);
    }

    #[test]
    fn test_legacy_profile_copies_fields() {
        let profile = MigrationVariant::Legacy.profile();
        assert_eq!(profile.contributing_module, FieldSource::CopyFromRecord);
        assert_eq!(profile.exposure_category, FieldSource::CopyFromRecord);
        assert!(!profile.has_preconditions());
        assert!(!profile.is_excluded("nist_csf_v1"));
    }

    #[test]
    fn test_remapped_profile_exclusions() {
        let profile = MigrationVariant::Remapped.profile_with("GRC", "Misconfiguration");
        assert!(profile.is_excluded("nist_csf_v1"));
        assert!(profile.is_excluded("scf_2023_2"));
        assert!(!profile.is_excluded("scf_2023_4"));
        assert_eq!(profile.contributing_module, FieldSource::Fixed(vec!["GRC".to_string()]));
        assert_eq!(profile.exposure_category, FieldSource::Fixed("Misconfiguration".to_string()));
        assert_eq!(profile.output_naming, OutputNaming::NewId);
        assert!(profile.remap_ids);
    }

    #[test]
    fn test_enriched_profile_keeps_nist_v1() {
        let profile = MigrationVariant::Enriched.profile();
        assert!(!profile.is_excluded("nist_csf_v1"));
        assert!(profile.is_excluded("scf_2023_2"));
        assert_eq!(profile.output_naming, OutputNaming::SourceFileName);
    }
}
