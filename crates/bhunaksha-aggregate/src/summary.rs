//! Per-village summary rows and the combined district table.

use crate::category::{BucketTotals, Category};
use crate::error::{AggregateError, Result};
use bhunaksha_core::{label_of, ParcelRecord};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TABLE_EXTENSION: &str = "csv";

/// Byte order mark so spreadsheet tools detect UTF-8 place names.
const UTF8_BOM: &str = "\u{feff}";

/// Summary of one village table.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    /// Village code with its two trailing digits removed
    pub village_code: String,
    /// Village name
    pub village_name: String,
    /// Taluka name without its number prefix
    pub taluka_name: String,
    /// Area sums and counts per class
    pub totals: BucketTotals,
}

impl AggregateRow {
    /// Column names of the combined table.
    #[must_use]
    pub fn headers() -> Vec<String> {
        let mut headers = vec![
            "village_code".to_string(),
            "village_name".to_string(),
            "taluka_name".to_string(),
        ];
        headers.extend(Category::ALL.iter().map(|c| c.label().to_string()));
        headers.extend(Category::ALL.iter().map(|c| format!("{}_count", c.label())));
        headers
    }

    fn to_record(&self) -> Vec<String> {
        let mut record = vec![
            self.village_code.clone(),
            self.village_name.clone(),
            self.taluka_name.clone(),
        ];
        record.extend(Category::ALL.iter().map(|c| self.totals.sum(*c).to_string()));
        record.extend(Category::ALL.iter().map(|c| self.totals.count(*c).to_string()));
        record
    }
}

/// Split `"<code> <name>"` and drop the code's last two characters.
fn split_village_stem(stem: &str) -> Option<(String, String)> {
    let (code, name) = stem.split_once(' ')?;
    let keep = code.char_indices().rev().nth(1).map_or(0, |(i, _)| i);
    Some((code[..keep].to_string(), name.to_string()))
}

/// Taluka name from a `"<number> <name>"` folder name.
fn taluka_name(folder: &str) -> &str {
    folder.split_once(' ').map_or(folder, |(_, name)| name)
}

/// Summarize one village table.
pub fn aggregate_item(path: &Path, taluka: &str) -> Result<AggregateRow> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AggregateError::InvalidFileName(path.to_path_buf()))?;
    let (village_code, village_name) = split_village_stem(&label_of(stem))
        .ok_or_else(|| AggregateError::InvalidFileName(path.to_path_buf()))?;

    let mut totals = BucketTotals::default();
    let mut reader = csv::Reader::from_path(path)?;
    for record in reader.deserialize() {
        let record: ParcelRecord = record?;
        match record.total_area_hectares() {
            Some(area) => {
                if !totals.add(area) {
                    tracing::debug!("{}: area {} outside every class", stem, area);
                }
            }
            None => tracing::warn!(
                "{}: dropping survey {} with non-numeric area '{}'",
                stem,
                record.survey_no,
                record.total_area
            ),
        }
    }

    Ok(AggregateRow {
        village_code,
        village_name,
        taluka_name: taluka.to_string(),
        totals,
    })
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

/// Summarize every village table in a taluka folder.
///
/// Tables with an unexpected file name are skipped.
pub fn aggregate_taluka(dir: &Path) -> Result<Vec<AggregateRow>> {
    let folder = label_of(dir.file_name().and_then(|s| s.to_str()).unwrap_or_default());
    let taluka = taluka_name(&folder);

    let tables: Vec<PathBuf> = sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(TABLE_EXTENSION))
        .collect();

    let mut rows = Vec::with_capacity(tables.len());
    for (i, table) in tables.iter().enumerate() {
        tracing::info!("Processing village {}/{} in taluka '{}'", i + 1, tables.len(), taluka);
        match aggregate_item(table, taluka) {
            Ok(row) => rows.push(row),
            Err(e @ AggregateError::InvalidFileName(_)) => tracing::warn!("Skipping: {}", e),
            Err(e) => return Err(e),
        }
    }
    Ok(rows)
}

/// Summarize every taluka folder under a district root.
pub fn aggregate_district(root: &Path) -> Result<Vec<AggregateRow>> {
    if !root.is_dir() {
        return Err(AggregateError::NotADirectory(root.to_path_buf()));
    }

    let talukas: Vec<PathBuf> = sorted_entries(root)?
        .into_iter()
        .filter(|p| {
            p.is_dir()
                && !p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
        })
        .collect();

    let mut rows = Vec::new();
    for (i, taluka) in talukas.iter().enumerate() {
        tracing::info!("Processing taluka {}/{}", i + 1, talukas.len());
        rows.extend(aggregate_taluka(taluka)?);
    }
    Ok(rows)
}

/// Write the combined table atomically.
pub fn write_csv(rows: &[AggregateRow], path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(UTF8_BOM.as_bytes())?;
    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.write_record(AggregateRow::headers())?;
        for row in rows {
            writer.write_record(row.to_record())?;
        }
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| AggregateError::Io(e.error))?;

    tracing::info!("Wrote {} village rows to {}", rows.len(), path.display());
    Ok(())
}
