//! Shared types used across the harvester.
//!
//! This module defines the work unit, the parcel record harvested for it,
//! and the fixed dependent-selector hierarchy the portal exposes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One leaf unit of work: an entry of the village dropdown.
///
/// Identity is the `name`; the `index` is the option position observed
/// during discovery and is only used for log file naming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    /// Option index in the village dropdown (placeholder is 0)
    pub index: usize,
    /// Option label, unique within a taluka
    pub name: String,
}

impl WorkItem {
    /// Create a new work item.
    #[must_use]
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.index, self.name)
    }
}

/// The ancestor selection a crawl is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTarget {
    /// Option index in the district dropdown
    pub district_index: usize,
    /// Option index in the taluka dropdown
    pub taluka_index: usize,
}

/// The five dependent selector levels, in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SelectionLevel {
    /// Level 0
    State,
    /// Level 1
    Category,
    /// Level 2
    District,
    /// Level 3
    Taluka,
    /// Level 4, the work item level
    Village,
}

impl SelectionLevel {
    /// Zero-based depth of this level.
    #[must_use]
    pub fn depth(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SelectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SelectionLevel::State => "state",
            SelectionLevel::Category => "category",
            SelectionLevel::District => "district",
            SelectionLevel::Taluka => "taluka",
            SelectionLevel::Village => "village",
        };
        f.write_str(label)
    }
}

/// One parcel entry from a plot detail panel.
///
/// Values are kept exactly as the portal renders them; numeric views are
/// derived on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParcelRecord {
    /// Survey number
    #[serde(rename = "Survey No.")]
    pub survey_no: String,
    /// Total area in hectares
    #[serde(rename = "Total Area")]
    pub total_area: String,
    /// Uncultivable (pot kharaba) area
    #[serde(rename = "Pot kharaba")]
    pub pot_kharaba: String,
    /// Owner name(s)
    #[serde(rename = "Owner Name")]
    pub owner_name: String,
    /// Khata number
    #[serde(rename = "Khata No.")]
    pub khata_no: String,
}

impl ParcelRecord {
    /// Total area as a number, if it parses.
    #[must_use]
    pub fn total_area_hectares(&self) -> Option<f64> {
        self.total_area.trim().parse().ok()
    }
}

/// Ordered parcel records harvested for one work item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemResult {
    records: Vec<ParcelRecord>,
}

impl ItemResult {
    /// Create an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records in order.
    pub fn extend(&mut self, records: impl IntoIterator<Item = ParcelRecord>) {
        self.records.extend(records);
    }

    /// Remove records identical on every field, keeping first occurrences.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::with_capacity(self.records.len());
        self.records.retain(|record| seen.insert(record.clone()));
    }

    /// Records in harvest order.
    #[must_use]
    pub fn records(&self) -> &[ParcelRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record was harvested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<ParcelRecord> for ItemResult {
    fn from_iter<I: IntoIterator<Item = ParcelRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}
