//! Shared work registry: the static work list plus the claimed-name set.

use bhunaksha_core::WorkItem;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Hands out work items so that no name is ever given to two workers.
///
/// A name is marked claimed in the same critical section that returns it,
/// so a failed item stays claimed for the rest of the run.
#[derive(Debug)]
pub struct WorkRegistry {
    items: Vec<WorkItem>,
    claimed: Mutex<HashSet<String>>,
}

impl WorkRegistry {
    /// Create a registry over a discovered work list.
    #[must_use]
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Mark names as already claimed, e.g. items with persisted output.
    ///
    /// Returns how many names were not claimed before.
    pub fn seed<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        names
            .into_iter()
            .map(Into::into)
            .fold(0, |added, name| added + usize::from(claimed.insert(name)))
    }

    /// Claim the first item in list order whose name is unclaimed.
    pub fn claim(&self) -> Option<WorkItem> {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        let item = self.items.iter().find(|item| !claimed.contains(&item.name))?;
        claimed.insert(item.name.clone());
        Some(item.clone())
    }
}
