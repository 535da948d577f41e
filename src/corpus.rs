use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use crate::{
    config::MigrationConfig,
    record::{NewCeiRecord, OldCeiRecord},
    reporter::{Operation, RunSummary},
    side_table::{self, SideTableError},
    transformation_engine::{Lookups, TransformationEngine},
    validation::{validate_preconditions, PresenceCheck, ValidationReport, ValidationSetupError},
    variant::OutputNaming,
};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("Failed to read input directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize CEI {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    SideTable(#[from] SideTableError),

    #[error(transparent)]
    Setup(#[from] ValidationSetupError),

    #[error("Precondition check failed with {} error(s)", .0.errors.len())]
    PreconditionFailed(ValidationReport),

    #[error("{} output file(s) would be written by more than one record", .0.len())]
    OutputCollision(Vec<OutputCollision>),

    #[error("Output file names must stay inside the output directory: {}", .0.join(", "))]
    UnsafeOutputName(Vec<String>),
}

/// Several input records that resolve to the same output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCollision {
    pub file_name: String,
    pub sources: Vec<PathBuf>,
}

/// Which records a migration targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Normalized ids, matched against input file stems
    Ids(Vec<String>),
}

impl Selection {
    /// Build a selection from a comma-separated list typed by a user
    pub fn parse(input: &str, id_prefix: &str) -> Self {
        let mut ids: Vec<String> = Vec::new();
        for raw in input.split(',') {
            if let Some(id) = normalize_requested_id(raw, id_prefix) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Self::Ids(ids)
    }
}

/// Trim, drop a trailing `.json` and make sure the id carries `prefix`
pub fn normalize_requested_id(raw: &str, prefix: &str) -> Option<String> {
    let mut id = raw.trim();
    if id.to_ascii_lowercase().ends_with(".json") {
        id = id[..id.len() - ".json".len()].trim_end();
    }
    if id.is_empty() {
        return None;
    }

    if id.len() >= prefix.len()
        && id.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    {
        Some(format!("{}{}", prefix, &id[prefix.len()..]))
    } else {
        Some(format!("{}{}", prefix, id))
    }
}

/// One parsed input file
#[derive(Debug, Clone)]
pub struct InputRecord {
    pub path: PathBuf,
    pub stem: String,
    pub record: OldCeiRecord,
}

#[derive(Debug, Clone)]
pub enum CorpusEntry {
    Parsed(InputRecord),
    Skipped { path: PathBuf, reason: String },
}

impl CorpusEntry {
    pub fn parsed(&self) -> Option<&InputRecord> {
        match self {
            Self::Parsed(input) => Some(input),
            Self::Skipped { .. } => None,
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `*.json` files directly inside `dir`, sorted by name
pub fn list_input_files(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let read_err = |source| CorpusError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        if is_json && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read, parse and presence-check one input file
pub fn read_entry(path: &Path, check: &PresenceCheck) -> CorpusEntry {
    let skip = |reason: String| {
        warn!(file = %path.display(), %reason, "skipping input record");
        CorpusEntry::Skipped {
            path: path.to_path_buf(),
            reason,
        }
    };

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => return skip(format!("unreadable: {}", e)),
    };
    let value: Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => return skip(format!("invalid JSON: {}", e)),
    };
    if let Err(problems) = check.check(&value) {
        return skip(format!("missing required fields: {}", problems.join("; ")));
    }
    match OldCeiRecord::from_value(value) {
        Ok(record) => CorpusEntry::Parsed(InputRecord {
            path: path.to_path_buf(),
            stem: file_stem(path),
            record,
        }),
        Err(e) => skip(format!("unexpected record shape: {}", e)),
    }
}

fn read_entries(files: &[PathBuf]) -> Result<Vec<CorpusEntry>, CorpusError> {
    let check = PresenceCheck::for_old_records()?;
    Ok(files.iter().map(|path| read_entry(path, &check)).collect())
}

/// Framework names seen across a pass
#[derive(Debug, Default)]
struct FrameworkScan {
    frameworks: BTreeSet<String>,
    processed: usize,
    skipped: usize,
}

impl FrameworkScan {
    fn observe(mut self, entry: &CorpusEntry) -> Self {
        match entry.parsed() {
            Some(input) => {
                self.frameworks.extend(input.record.framework_names());
                self.processed += 1;
            }
            None => self.skipped += 1,
        }
        self
    }
}

/// `(id, title)` pairs seen across a pass
#[derive(Debug, Default)]
struct TitleScan {
    titles: BTreeMap<String, String>,
    processed: usize,
    skipped: usize,
}

impl TitleScan {
    fn observe(mut self, entry: &CorpusEntry) -> Self {
        match entry.parsed() {
            Some(input) => {
                self.titles
                    .insert(input.record.cei_code.clone(), input.record.cei_title.clone());
                self.processed += 1;
            }
            None => self.skipped += 1,
        }
        self
    }
}

/// Regenerate the framework normalization table from the corpus
pub fn detect_frameworks(config: &MigrationConfig) -> Result<RunSummary, CorpusError> {
    let entries = read_entries(&list_input_files(&config.input_dir)?)?;
    let scan = entries.iter().fold(FrameworkScan::default(), FrameworkScan::observe);

    let existing = side_table::load_framework_map(&config.frameworks_table)?;
    let rows = side_table::merge_frameworks(&scan.frameworks, &existing);

    let mut summary = RunSummary::new(Operation::DetectFrameworks, config.variant);
    summary.processed = scan.processed;
    summary.skipped = scan.skipped;

    if rows.is_empty() {
        info!("no frameworks detected in any CEI file");
        return Ok(summary);
    }

    side_table::write_frameworks(&config.frameworks_table, &rows)?;
    info!(
        detected = scan.frameworks.len(),
        total = rows.len(),
        "framework table regenerated"
    );
    summary.output = Some(config.frameworks_table.clone());
    summary.written.push(config.frameworks_table.clone());
    Ok(summary)
}

/// Regenerate the enrichment table from the corpus
pub fn extract_titles(config: &MigrationConfig) -> Result<RunSummary, CorpusError> {
    let entries = read_entries(&list_input_files(&config.input_dir)?)?;
    let scan = entries.iter().fold(TitleScan::default(), TitleScan::observe);

    let existing = side_table::load_title_table(&config.titles_table)?;
    let rows = side_table::merge_titles(&scan.titles, &existing);

    let mut summary = RunSummary::new(Operation::ExtractTitles, config.variant);
    summary.processed = scan.processed;
    summary.skipped = scan.skipped;

    if rows.is_empty() {
        info!("no titles collected");
        return Ok(summary);
    }

    side_table::write_titles(&config.titles_table, &rows)?;
    info!(collected = scan.titles.len(), total = rows.len(), "enrichment table regenerated");
    summary.output = Some(config.titles_table.clone());
    summary.written.push(config.titles_table.clone());
    Ok(summary)
}

/// Migrate the selected records into `config.output_dir`.
///
/// Nothing is written unless the precondition gate and the collision check
/// both pass for the whole batch.
pub fn migrate(config: &MigrationConfig, selection: &Selection) -> Result<RunSummary, CorpusError> {
    let profile = config.profile();
    let operation = match selection {
        Selection::All => Operation::MigrateAll,
        Selection::Ids(_) => Operation::MigrateSpecific,
    };
    let mut summary = RunSummary::new(operation, config.variant);

    let mut files = list_input_files(&config.input_dir)?;
    if let Selection::Ids(ids) = selection {
        let stems: BTreeSet<String> = files.iter().map(|path| file_stem(path)).collect();
        summary.requested = ids.len();
        summary.not_found = ids.iter().filter(|id| !stems.contains(*id)).cloned().collect();
        files.retain(|path| ids.contains(&file_stem(path)));
    }

    let entries = read_entries(&files)?;
    let inputs: Vec<&InputRecord> = entries.iter().filter_map(CorpusEntry::parsed).collect();
    summary.skipped = entries.len() - inputs.len();

    let lookups = if profile.has_preconditions() {
        Lookups {
            frameworks: side_table::load_framework_map(&config.frameworks_table)?,
            enrichment: side_table::load_enrichment(&config.titles_table)?,
        }
    } else {
        Lookups::default()
    };

    let targets: Vec<&OldCeiRecord> = inputs.iter().map(|input| &input.record).collect();
    let report = validate_preconditions(&profile, &lookups, &targets);
    for warning in &report.warnings {
        warn!(subject = %warning.subject, "{}", warning.message);
    }
    if report.has_errors() {
        return Err(CorpusError::PreconditionFailed(report));
    }

    let engine = TransformationEngine::new(profile, lookups);
    let outputs: Vec<(String, &InputRecord, NewCeiRecord)> = inputs
        .iter()
        .map(|input| {
            let record = engine.transform(&input.record);
            (output_file_name(engine.profile().output_naming, input, &record), *input, record)
        })
        .collect();

    let unsafe_names: Vec<String> = outputs
        .iter()
        .filter(|(file_name, _, _)| !is_plain_file_name(file_name))
        .map(|(file_name, input, _)| format!("{} (from {})", file_name, input.path.display()))
        .collect();
    if !unsafe_names.is_empty() {
        return Err(CorpusError::UnsafeOutputName(unsafe_names));
    }

    let collisions = find_collisions(&outputs);
    if !collisions.is_empty() {
        return Err(CorpusError::OutputCollision(collisions));
    }

    fs::create_dir_all(&config.output_dir).map_err(|source| CorpusError::Write {
        path: config.output_dir.clone(),
        source,
    })?;

    for (file_name, input, record) in &outputs {
        let path = config.output_dir.join(file_name);
        let json = serde_json::to_string_pretty(record).map_err(|source| CorpusError::Serialize {
            id: record.id.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| CorpusError::Write {
            path: path.clone(),
            source,
        })?;

        info!(source = %input.path.display(), output = %path.display(), "migrated CEI");
        summary.processed += 1;
        summary.written.push(path);
    }

    summary.output = Some(config.output_dir.clone());
    Ok(summary)
}

fn output_file_name(naming: OutputNaming, input: &InputRecord, record: &NewCeiRecord) -> String {
    match naming {
        OutputNaming::SourceFileName => input
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.json", input.stem)),
        OutputNaming::NewId => format!("{}.json", record.id),
    }
}

/// A single normal path component with no separators and no `..`
fn is_plain_file_name(name: &str) -> bool {
    let stem = name.strip_suffix(".json").unwrap_or(name);
    if stem.trim().is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn find_collisions(outputs: &[(String, &InputRecord, NewCeiRecord)]) -> Vec<OutputCollision> {
    let mut by_name: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();
    for (file_name, input, _) in outputs {
        by_name.entry(file_name.as_str()).or_default().push(input.path.clone());
    }

    by_name
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(file_name, sources)| OutputCollision {
            file_name: file_name.to_string(),
            sources,
        })
        .collect()
}
