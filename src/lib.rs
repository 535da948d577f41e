// CEI schema migration and side-table maintenance
pub mod condition;
pub mod config;
pub mod corpus;
pub mod record;
pub mod reporter;
pub mod side_table;
pub mod transformation_engine;
pub mod validation;
pub mod variant;

// Re-export core types for convenience
pub use condition::extract_condition;
pub use config::MigrationConfig;
pub use corpus::{detect_frameworks, extract_titles, migrate, CorpusError, Selection};
pub use record::{FindingConfigEntry, NewCeiRecord, OldCeiRecord};
pub use reporter::{ReportFormat, RunReporter, RunSummary};
pub use transformation_engine::{Lookups, TransformationEngine};
pub use validation::{ValidationReport, ValidationError, ValidationWarning};
pub use variant::{MigrationProfile, MigrationVariant};
