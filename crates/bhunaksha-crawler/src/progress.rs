//! Live per-worker progress.
//!
//! Workers write [`ProgressEntry`] values into a [`ProgressRegistry`]; every
//! write bumps a version on a watch channel. A [`Reporter`] task listens on
//! that channel and re-renders the whole snapshot through a [`ProgressView`];
//! [`IndicatifView`] is the terminal one.
//! Rendering happens on the reporter task only, so a slow or failing
//! terminal never stalls a worker.

use chrono::{DateTime, Local};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Worker identity within one run.
pub type WorkerId = usize;

/// What one worker is doing right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEntry {
    /// Owning worker
    pub worker_id: WorkerId,
    /// Selection labels committed so far (district, taluka, village)
    pub ancestor_path: Vec<String>,
    /// Current navigation step
    pub current_step: String,
    /// Latest noteworthy message (retries, skips)
    pub message: Option<String>,
    /// When the entry last changed
    pub timestamp: DateTime<Local>,
}

impl ProgressEntry {
    /// Create an entry at its first step.
    #[must_use]
    pub fn new(worker_id: WorkerId, current_step: impl Into<String>) -> Self {
        Self {
            worker_id,
            ancestor_path: Vec::new(),
            current_step: current_step.into(),
            message: None,
            timestamp: Local::now(),
        }
    }

    /// One-line description: ancestor path, step and latest message.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = if self.ancestor_path.is_empty() {
            self.current_step.clone()
        } else {
            format!("{} | {}", self.ancestor_path.join(" / "), self.current_step)
        };
        if let Some(message) = &self.message {
            line.push_str(" | ");
            line.push_str(message);
        }
        line
    }
}

/// Shared mapping from worker to its current status.
#[derive(Debug)]
pub struct ProgressRegistry {
    entries: Mutex<BTreeMap<WorkerId, ProgressEntry>>,
    version: watch::Sender<u64>,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            version,
        }
    }

    /// Replace a worker's entry.
    pub fn set(&self, entry: ProgressEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.worker_id, entry);
        self.bump();
    }

    /// Mutate a worker's entry in place, creating it if absent.
    pub fn update(&self, worker_id: WorkerId, change: impl FnOnce(&mut ProgressEntry)) {
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = entries
                .entry(worker_id)
                .or_insert_with(|| ProgressEntry::new(worker_id, "starting"));
            change(entry);
            entry.timestamp = Local::now();
        }
        self.bump();
    }

    /// Remove a worker's entry.
    pub fn clear(&self, worker_id: WorkerId) {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&worker_id);
        if removed.is_some() {
            self.bump();
        }
    }

    /// Copy of all current entries, ordered by worker.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<WorkerId, ProgressEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receiver notified after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// A worker's write handle onto the registry.
#[derive(Debug, Clone)]
pub struct WorkerProgress {
    worker_id: WorkerId,
    registry: Arc<ProgressRegistry>,
}

impl WorkerProgress {
    /// Bind a worker id to a registry.
    #[must_use]
    pub fn new(worker_id: WorkerId, registry: Arc<ProgressRegistry>) -> Self {
        Self {
            worker_id,
            registry,
        }
    }

    /// The bound worker id.
    #[must_use]
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Start a fresh entry for a new item.
    pub fn begin(&self, step: impl Into<String>) {
        self.registry.set(ProgressEntry::new(self.worker_id, step));
    }

    /// Record the current navigation step.
    pub fn step(&self, step: impl Into<String>) {
        let step = step.into();
        self.registry.update(self.worker_id, |entry| entry.current_step = step);
    }

    /// Replace the ancestor path.
    pub fn path(&self, path: &[String]) {
        self.registry
            .update(self.worker_id, |entry| entry.ancestor_path = path.to_vec());
    }

    /// Attach a message to the entry.
    pub fn note(&self, message: impl Into<String>) {
        let message = message.into();
        self.registry
            .update(self.worker_id, |entry| entry.message = Some(message));
    }

    /// Drop the entry; the worker is between items.
    pub fn clear(&self) {
        self.registry.clear(self.worker_id);
    }
}

/// Everything one render shows.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressFrame {
    /// Items with confirmed persisted output
    pub completed: usize,
    /// Size of the work list
    pub total: usize,
    /// Active worker entries
    pub entries: BTreeMap<WorkerId, ProgressEntry>,
}

/// Destination of progress renders.
pub trait ProgressView: Send {
    /// Show one frame, replacing the previous one.
    fn render(&mut self, frame: &ProgressFrame) -> io::Result<()>;
}

const HEADER_TEMPLATE: &str = "{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} [{elapsed}]";
const WORKER_TEMPLATE: &str = "{spinner:.green} {prefix:.bold} {wide_msg}";

/// Draws the frame as `indicatif` bars: a completion bar and one spinner per
/// active worker.
///
/// Log output must go through [`MultiProgress::suspend`] on the same
/// `MultiProgress` so lines are not torn by redraws.
pub struct IndicatifView {
    multi: MultiProgress,
    header: ProgressBar,
    workers: BTreeMap<WorkerId, ProgressBar>,
}

impl IndicatifView {
    /// Attach a view to `multi`.
    #[must_use]
    pub fn new(multi: MultiProgress) -> Self {
        let header = multi.add(ProgressBar::new(0));
        header.set_style(
            ProgressStyle::with_template(HEADER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        header.set_prefix("Completed villages");
        Self {
            multi,
            header,
            workers: BTreeMap::new(),
        }
    }

    /// Workers that currently have a line.
    #[must_use]
    pub fn active_workers(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    /// Header position and length.
    #[must_use]
    pub fn completion(&self) -> (u64, u64) {
        (self.header.position(), self.header.length().unwrap_or(0))
    }

    /// Message shown on a worker's line.
    #[must_use]
    pub fn worker_message(&self, worker_id: WorkerId) -> Option<String> {
        self.workers.get(&worker_id).map(ProgressBar::message)
    }

    fn worker_bar(&mut self, worker_id: WorkerId) -> &ProgressBar {
        let multi = &self.multi;
        self.workers.entry(worker_id).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::with_template(WORKER_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_prefix(format!("Worker {worker_id}"));
            bar
        })
    }
}

impl Default for IndicatifView {
    fn default() -> Self {
        Self::new(MultiProgress::new())
    }
}

impl ProgressView for IndicatifView {
    fn render(&mut self, frame: &ProgressFrame) -> io::Result<()> {
        self.header.set_length(frame.total as u64);
        self.header.set_position(frame.completed as u64);

        let idle: Vec<WorkerId> = self
            .workers
            .keys()
            .filter(|id| !frame.entries.contains_key(id))
            .copied()
            .collect();
        for worker_id in idle {
            if let Some(bar) = self.workers.remove(&worker_id) {
                bar.finish_and_clear();
                self.multi.remove(&bar);
            }
        }

        for (worker_id, entry) in &frame.entries {
            let bar = self.worker_bar(*worker_id);
            bar.set_message(entry.summary());
            bar.tick();
        }
        Ok(())
    }
}

impl Drop for IndicatifView {
    fn drop(&mut self) {
        for bar in self.workers.values() {
            bar.finish_and_clear();
        }
        self.header.abandon();
    }
}

/// Counts completed items for the frame header.
pub type CompletedCounter = Arc<dyn Fn() -> usize + Send + Sync>;

/// Re-renders progress whenever the registry changes.
pub struct Reporter {
    registry: Arc<ProgressRegistry>,
    completed: CompletedCounter,
    total: usize,
}

impl Reporter {
    /// Create a reporter over a registry.
    #[must_use]
    pub fn new(registry: Arc<ProgressRegistry>, completed: CompletedCounter, total: usize) -> Self {
        Self {
            registry,
            completed,
            total,
        }
    }

    /// Build the frame for the current state.
    #[must_use]
    pub fn frame(&self) -> ProgressFrame {
        ProgressFrame {
            completed: (self.completed)(),
            total: self.total,
            entries: self.registry.snapshot(),
        }
    }

    /// Render on every change until `shutdown` flips to true, then render once more.
    pub fn spawn(
        self,
        mut view: Box<dyn ProgressView>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let mut changes = self.registry.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        self.render(view.as_mut());
                    }
                    stop = shutdown.changed() => {
                        if stop.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            self.render(view.as_mut());
        })
    }

    fn render(&self, view: &mut dyn ProgressView) {
        if let Err(e) = view.render(&self.frame()) {
            tracing::debug!("progress render failed: {}", e);
        }
    }
}
