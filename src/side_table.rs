use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const FRAMEWORKS_TABLE: &str = "detected_frameworks.csv";
pub const TITLES_TABLE: &str = "cei_titles.csv";

#[derive(Debug, Error)]
pub enum SideTableError {
    #[error("Failed to read side table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write side table {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to flush side table {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Side table {path} has no '{column}' column")]
    MissingColumn { path: PathBuf, column: String },
}

/// One row of the framework normalization table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameworkRow {
    pub framework: String,
    pub normalized_framework: String,
}

/// One row of the enrichment table. Field order is the column order on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TitleRow {
    pub cei_id: String,
    pub assessment_id: String,
    pub title: String,
    pub finding_title: String,
}

/// Raw framework name -> normalized name (possibly empty, i.e. not curated yet)
pub type FrameworkMap = BTreeMap<String, String>;

/// Old CEI id -> enrichment row
pub type TitleTable = BTreeMap<String, TitleRow>;

/// Lookup maps built from a single read of the enrichment table, all keyed by old CEI id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentMaps {
    pub finding_titles: BTreeMap<String, String>,
    pub assessment_ids: BTreeMap<String, String>,
    pub titles: BTreeMap<String, String>,
}

impl EnrichmentMaps {
    pub fn from_table(table: &TitleTable) -> Self {
        let mut maps = Self::default();
        for (id, row) in table {
            maps.finding_titles.insert(id.clone(), row.finding_title.clone());
            maps.assessment_ids.insert(id.clone(), row.assessment_id.clone());
            maps.titles.insert(id.clone(), row.title.clone());
        }
        maps
    }

    pub fn contains(&self, id: &str) -> bool {
        self.titles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

/// Header name (lowercased) -> column index
fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect()
}

fn get_field(record: &StringRecord, header_map: &HashMap<String, usize>, field: &str) -> String {
    header_map
        .get(field)
        .and_then(|&idx| record.get(idx))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Read every record of a CSV file. A missing file reads as `None`.
fn read_records(path: &Path) -> Result<Option<(HashMap<String, usize>, Vec<StringRecord>)>, SideTableError> {
    if !path.exists() {
        debug!(path = %path.display(), "side table not found, treating as empty");
        return Ok(None);
    }

    let read_err = |source| SideTableError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(read_err)?;

    let headers = rdr.headers().map_err(read_err)?.clone();
    let header_map = build_header_map(&headers);

    let mut records = Vec::new();
    for result in rdr.records() {
        records.push(result.map_err(read_err)?);
    }

    Ok(Some((header_map, records)))
}

/// Load the framework normalization table. Empty keys are ignored; the last row for a key wins.
pub fn load_framework_map(path: &Path) -> Result<FrameworkMap, SideTableError> {
    let mut map = FrameworkMap::new();
    let Some((header_map, records)) = read_records(path)? else {
        return Ok(map);
    };

    if !header_map.contains_key("framework") {
        return Err(SideTableError::MissingColumn {
            path: path.to_path_buf(),
            column: "framework".to_string(),
        });
    }

    for record in &records {
        let framework = get_field(record, &header_map, "framework");
        if framework.is_empty() {
            continue;
        }
        let normalized = get_field(record, &header_map, "normalized_framework");
        map.insert(framework, normalized);
    }

    info!(path = %path.display(), frameworks = map.len(), "loaded framework table");
    Ok(map)
}

/// Load the enrichment table keyed by CEI id. Accepts the older `id` column name.
pub fn load_title_table(path: &Path) -> Result<TitleTable, SideTableError> {
    let mut table = TitleTable::new();
    let Some((header_map, records)) = read_records(path)? else {
        return Ok(table);
    };

    let key_column = if header_map.contains_key("cei_id") {
        "cei_id"
    } else if header_map.contains_key("id") {
        "id"
    } else {
        return Err(SideTableError::MissingColumn {
            path: path.to_path_buf(),
            column: "cei_id".to_string(),
        });
    };

    for record in &records {
        let cei_id = get_field(record, &header_map, key_column);
        if cei_id.is_empty() {
            continue;
        }
        let row = TitleRow {
            cei_id: cei_id.clone(),
            assessment_id: get_field(record, &header_map, "assessment_id"),
            title: get_field(record, &header_map, "title"),
            finding_title: get_field(record, &header_map, "finding_title"),
        };
        table.insert(cei_id, row);
    }

    info!(path = %path.display(), rows = table.len(), "loaded enrichment table");
    Ok(table)
}

pub fn load_enrichment(path: &Path) -> Result<EnrichmentMaps, SideTableError> {
    Ok(EnrichmentMaps::from_table(&load_title_table(path)?))
}

/// Union of observed frameworks and existing rows, sorted by framework name.
/// Existing normalized values always survive.
pub fn merge_frameworks(observed: &BTreeSet<String>, existing: &FrameworkMap) -> Vec<FrameworkRow> {
    let mut merged: BTreeMap<&str, &str> = existing
        .iter()
        .map(|(framework, normalized)| (framework.as_str(), normalized.as_str()))
        .collect();

    for framework in observed {
        merged.entry(framework.as_str()).or_insert("");
    }

    merged
        .into_iter()
        .map(|(framework, normalized)| FrameworkRow {
            framework: framework.to_string(),
            normalized_framework: normalized.to_string(),
        })
        .collect()
}

/// Union of observed `(id, title)` pairs and existing rows, sorted by id.
///
/// Titles come from the corpus when it has the id. `finding_title` and
/// `assessment_id` always come from the existing table.
pub fn merge_titles(observed: &BTreeMap<String, String>, existing: &TitleTable) -> Vec<TitleRow> {
    let mut merged = existing.clone();

    for (id, title) in observed {
        merged
            .entry(id.clone())
            .and_modify(|row| row.title = title.clone())
            .or_insert_with(|| TitleRow {
                cei_id: id.clone(),
                title: title.clone(),
                ..TitleRow::default()
            });
    }

    merged.into_values().collect()
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), SideTableError> {
    let write_err = |source| SideTableError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(write_err)?;

    for row in rows {
        writer.serialize(row).map_err(write_err)?;
    }

    writer.flush().map_err(|source| SideTableError::Flush {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_frameworks(path: &Path, rows: &[FrameworkRow]) -> Result<(), SideTableError> {
    write_rows(path, rows)?;
    info!(path = %path.display(), rows = rows.len(), "wrote framework table");
    Ok(())
}

pub fn write_titles(path: &Path, rows: &[TitleRow]) -> Result<(), SideTableError> {
    write_rows(path, rows)?;
    info!(path = %path.display(), rows = rows.len(), "wrote enrichment table");
    Ok(())
}
