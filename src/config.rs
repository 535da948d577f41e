use std::path::PathBuf;
use crate::{
    side_table::{FRAMEWORKS_TABLE, TITLES_TABLE},
    variant::{MigrationProfile, MigrationVariant, DEFAULT_CONTRIBUTING_MODULE, DEFAULT_EXPOSURE_CATEGORY},
};

pub const DEFAULT_INPUT_DIR: &str = "Old CEIs";
pub const DEFAULT_OUTPUT_DIR: &str = "New CEIs";
pub const DEFAULT_ID_PREFIX: &str = "CEI-";

/// Where a run reads and writes, and which migration rules it applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub frameworks_table: PathBuf,
    pub titles_table: PathBuf,
    pub variant: MigrationVariant,
    /// Prefix every CEI id carries; added to requested ids that lack it
    pub id_prefix: String,
    pub contributing_module: String,
    pub exposure_category: String,
}

impl MigrationConfig {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Place both side tables in `dir`
    pub fn with_tables_in(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.frameworks_table = dir.join(FRAMEWORKS_TABLE);
        self.titles_table = dir.join(TITLES_TABLE);
        self
    }

    pub fn with_variant(mut self, variant: MigrationVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn profile(&self) -> MigrationProfile {
        self.variant
            .profile_with(&self.contributing_module, &self.exposure_category)
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            frameworks_table: PathBuf::from(FRAMEWORKS_TABLE),
            titles_table: PathBuf::from(TITLES_TABLE),
            variant: MigrationVariant::default(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            contributing_module: DEFAULT_CONTRIBUTING_MODULE.to_string(),
            exposure_category: DEFAULT_EXPOSURE_CATEGORY.to_string(),
        }
    }
}
