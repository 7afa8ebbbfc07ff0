//! Persisted output store.
//!
//! One CSV table per village at `{root}/{district}/{taluka}/{village}.csv`,
//! written atomically so a crash never leaves a half-written file that a
//! later run would mistake for completed work. Path segments are the
//! labels' [`file_stem`]s. Also hosts the discovery cache under
//! `{root}/.discovery/`.

use crate::error::{CrawlError, Result};
use crate::navigator::Discovery;
use bhunaksha_core::{file_stem, CrawlTarget, ItemResult, ParcelRecord, WorkItem};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Column headers of a village table.
pub const HEADERS: [&str; 5] = ["Survey No.", "Total Area", "Pot kharaba", "Owner Name", "Khata No."];

const EXTENSION: &str = "csv";

/// Reads and writes per-village tables.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
}

impl OutputStore {
    /// Store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding one district's talukas.
    #[must_use]
    pub fn district_dir(&self, district: &str) -> PathBuf {
        self.root.join(file_stem(district))
    }

    /// Folder holding one taluka's village tables.
    #[must_use]
    pub fn taluka_dir(&self, district: &str, taluka: &str) -> PathBuf {
        self.district_dir(district).join(file_stem(taluka))
    }

    /// Table path for a village.
    #[must_use]
    pub fn item_path(&self, district: &str, taluka: &str, item: &str) -> PathBuf {
        self.taluka_dir(district, taluka)
            .join(format!("{}.{EXTENSION}", file_stem(item)))
    }

    /// Whether a village already has a persisted table.
    #[must_use]
    pub fn has_output(&self, district: &str, taluka: &str, item: &str) -> bool {
        self.item_path(district, taluka, item).is_file()
    }

    /// File stems of every table persisted for a taluka.
    pub fn persisted_stems(&self, district: &str, taluka: &str) -> Result<HashSet<String>> {
        let dir = self.taluka_dir(district, taluka);
        if !dir.exists() {
            return Ok(HashSet::new());
        }

        let mut stems = HashSet::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.insert(stem.to_string());
            }
        }
        Ok(stems)
    }

    /// Names of work items that already have output.
    pub fn persisted_items(
        &self,
        district: &str,
        taluka: &str,
        items: &[WorkItem],
    ) -> Result<Vec<String>> {
        let stems = self.persisted_stems(district, taluka)?;
        Ok(items
            .iter()
            .filter(|item| stems.contains(&file_stem(&item.name)))
            .map(|item| item.name.clone())
            .collect())
    }

    /// Number of work items with a persisted table.
    #[must_use]
    pub fn completed_count(&self, district: &str, taluka: &str, items: &[WorkItem]) -> usize {
        items
            .iter()
            .filter(|item| self.has_output(district, taluka, &item.name))
            .count()
    }

    /// Persist one village's records, replacing any previous table.
    pub fn write(
        &self,
        district: &str,
        taluka: &str,
        item: &str,
        result: &ItemResult,
    ) -> Result<PathBuf> {
        let target = self.item_path(district, taluka, item);
        let mut tmp = temp_beside(&target)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(tmp.as_file_mut());
            writer.write_record(HEADERS)?;
            for record in result.records() {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        persist(tmp, &target)?;
        Ok(target)
    }

    /// Read a persisted village table.
    pub fn read_records(path: &Path) -> Result<Vec<ParcelRecord>> {
        let mut reader = csv::Reader::from_path(path)?;
        let records = reader.deserialize().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Location of the cached discovery for a target.
    #[must_use]
    pub fn discovery_path(&self, target: CrawlTarget) -> PathBuf {
        self.root.join(".discovery").join(format!(
            "district_{}_taluka_{}.json",
            target.district_index, target.taluka_index
        ))
    }

    /// Cached discovery for a target, if one was saved.
    pub fn load_discovery(&self, target: CrawlTarget) -> Result<Option<Discovery>> {
        let path = self.discovery_path(target);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        let discovery: Discovery = serde_json::from_str(&contents)?;
        if discovery.target != target || discovery.items.is_empty() {
            tracing::warn!("Ignoring mismatched discovery cache at {}", path.display());
            return Ok(None);
        }
        Ok(Some(discovery))
    }

    /// Save a discovery so later runs can skip the live walk.
    pub fn save_discovery(&self, discovery: &Discovery) -> Result<PathBuf> {
        let target = self.discovery_path(discovery.target);
        let mut tmp = temp_beside(&target)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), discovery)?;
        tmp.as_file_mut().flush()?;
        persist(tmp, &target)?;
        Ok(target)
    }
}

fn temp_beside(target: &Path) -> Result<NamedTempFile> {
    let dir = target.parent().ok_or_else(|| {
        CrawlError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} has no parent directory", target.display()),
        ))
    })?;
    fs::create_dir_all(dir)?;
    Ok(NamedTempFile::new_in(dir)?)
}

fn persist(tmp: NamedTempFile, target: &Path) -> Result<()> {
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| CrawlError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(survey_no: &str) -> ParcelRecord {
        ParcelRecord {
            survey_no: survey_no.to_string(),
            total_area: "0.81".to_string(),
            pot_kharaba: "0.00".to_string(),
            owner_name: "Kale".to_string(),
            khata_no: "9".to_string(),
        }
    }

    #[test]
    fn test_item_path_keeps_labels_apart() {
        let store = OutputStore::new("/data");
        assert_eq!(
            store.item_path("07 Amravati", "03 Achalpur", "0100 Shirala/Kh"),
            PathBuf::from("/data/07 Amravati/03 Achalpur/0100 Shirala%2FKh.csv")
        );
        assert_ne!(
            store.item_path("D", "T", "12/A"),
            store.item_path("D", "T", "12_A")
        );
        assert_ne!(store.item_path("D", "T", "A"), store.item_path("D", "T", " A "));
    }

    #[test]
    fn test_lookalike_names_are_not_marked_done() {
        let tmp = TempDir::new().expect("temp dir");
        let store = OutputStore::new(tmp.path());
        let items = vec![
            WorkItem::new(1, "12/A"),
            WorkItem::new(2, "12_A"),
            WorkItem::new(3, "Wadgaon"),
            WorkItem::new(4, "Wadgaon "),
        ];

        store.write("D", "T", "12/A", &ItemResult::new()).expect("write 12/A");
        store.write("D", "T", "Wadgaon", &ItemResult::new()).expect("write Wadgaon");

        let done = store.persisted_items("D", "T", &items).expect("list");
        assert_eq!(done, vec!["12/A".to_string(), "Wadgaon".to_string()]);
        assert!(!store.has_output("D", "T", "12_A"));
        assert!(!store.has_output("D", "T", "Wadgaon "));
        assert_eq!(store.completed_count("D", "T", &items), 2);
    }

    #[test]
    fn test_write_then_read() {
        let tmp = TempDir::new().expect("temp dir");
        let store = OutputStore::new(tmp.path());
        let result: ItemResult = vec![record("1"), record("2")].into_iter().collect();

        let path = store.write("07 Amravati", "03 Achalpur", "0100 Wadgaon", &result).expect("write");
        assert_eq!(
            path,
            tmp.path().join("07 Amravati").join("03 Achalpur").join("0100 Wadgaon.csv")
        );

        let records = OutputStore::read_records(&path).expect("read");
        assert_eq!(records, result.records());
    }

    #[test]
    fn test_empty_result_still_has_headers() {
        let tmp = TempDir::new().expect("temp dir");
        let store = OutputStore::new(tmp.path());
        let path = store.write("D", "T", "V", &ItemResult::new()).expect("write");

        let contents = fs::read_to_string(&path).expect("read back");
        assert_eq!(contents.trim_end(), HEADERS.join(","));
        assert!(OutputStore::read_records(&path).expect("parse").is_empty());
    }

    #[test]
    fn test_persisted_items_and_completed_count() {
        let tmp = TempDir::new().expect("temp dir");
        let store = OutputStore::new(tmp.path());
        let items = vec![
            WorkItem::new(1, "A"),
            WorkItem::new(2, "B/1"),
            WorkItem::new(3, "C"),
        ];
        assert!(store.persisted_items("D", "T", &items).expect("list").is_empty());

        store.write("D", "T", "B/1", &ItemResult::new()).expect("write B");
        store.write("D", "T", "C", &ItemResult::new()).expect("write C");
        fs::write(store.taluka_dir("D", "T").join("notes.txt"), "x").expect("stray file");

        let done = store.persisted_items("D", "T", &items).expect("list");
        assert_eq!(done, vec!["B/1".to_string(), "C".to_string()]);
        assert_eq!(store.completed_count("D", "T", &items), 2);
    }

    #[test]
    fn test_discovery_cache_roundtrip_and_target_check() {
        let tmp = TempDir::new().expect("temp dir");
        let store = OutputStore::new(tmp.path());
        let target = CrawlTarget {
            district_index: 1,
            taluka_index: 7,
        };
        assert!(store.load_discovery(target).expect("load").is_none());

        let discovery = Discovery::new(target, "07 Amravati", "03 Achalpur", vec![WorkItem::new(1, "A")]);
        store.save_discovery(&discovery).expect("save");

        let loaded = store.load_discovery(target).expect("load").expect("cached");
        assert_eq!(loaded.items, discovery.items);
        assert_eq!(loaded.district_name, "07 Amravati");

        let other = CrawlTarget {
            district_index: 2,
            taluka_index: 7,
        };
        assert!(store.load_discovery(other).expect("load").is_none());
    }
}
