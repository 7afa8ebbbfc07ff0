//! Run orchestration.
//!
//! Discovers the work list once, seeds the claim set from output already on
//! disk, runs the worker pool to exhaustion and reports what happened.

use crate::error::{CrawlError, Result};
use crate::item_log::ItemLog;
use crate::navigator::{Discovery, Navigator};
use crate::output::OutputStore;
use crate::progress::{
    CompletedCounter, IndicatifView, ProgressRegistry, ProgressView, Reporter, WorkerProgress,
};
use crate::registry::WorkRegistry;
use crate::retry::RetryPolicy;
use crate::worker::{SessionGuard, Worker, WorkerContext};
use bhunaksha_browser::SessionFactory;
use bhunaksha_core::{AppConfig, CrawlTarget};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Log file of the discovery walk, under the log directory.
const DISCOVERY_LOG: &str = "log_village_discovery.txt";

/// Totals of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Size of the work list
    pub total: usize,
    /// Items skipped because output already existed
    pub already_done: usize,
    /// Items claimed and attempted this run
    pub attempted: usize,
    /// Items with a table written this run
    pub persisted: usize,
    /// Items whose navigation ended in an error
    pub failed: usize,
}

/// Coordinates discovery and the worker pool.
pub struct Orchestrator {
    config: Arc<AppConfig>,
    sessions: Arc<dyn SessionFactory>,
    store: Arc<OutputStore>,
    view: Option<Box<dyn ProgressView>>,
    show_progress: bool,
}

impl Orchestrator {
    /// Create an orchestrator rendering progress to the terminal.
    #[must_use]
    pub fn new(config: AppConfig, sessions: Arc<dyn SessionFactory>) -> Self {
        let store = Arc::new(OutputStore::new(config.output.data_dir.clone()));
        Self {
            config: Arc::new(config),
            sessions,
            store,
            view: None,
            show_progress: true,
        }
    }

    /// Render progress through `view` instead of the terminal.
    #[must_use]
    pub fn with_view(mut self, view: Box<dyn ProgressView>) -> Self {
        self.view = Some(view);
        self.show_progress = true;
        self
    }

    /// Run without a progress display.
    #[must_use]
    pub fn without_view(mut self) -> Self {
        self.view = None;
        self.show_progress = false;
        self
    }

    /// The output store this run writes to.
    #[must_use]
    pub fn store(&self) -> &OutputStore {
        &self.store
    }

    /// Produce the work list, from the cache when allowed.
    ///
    /// Any failure is reported as [`CrawlError::Discovery`].
    pub async fn discover(&self) -> Result<Discovery> {
        let target = self.config.target();
        if self.config.crawler.reuse_discovery {
            match self.store.load_discovery(target) {
                Ok(Some(discovery)) => {
                    tracing::info!(
                        "Using cached discovery: {} villages in '{}' / '{}'",
                        discovery.items.len(),
                        discovery.district_name,
                        discovery.taluka_name
                    );
                    return Ok(discovery);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Ignoring unreadable discovery cache: {}", e),
            }
        }

        let discovery = self.discover_live(target).await.map_err(|e| match e {
            CrawlError::Discovery(_) => e,
            other => CrawlError::Discovery(other.to_string()),
        })?;

        if let Err(e) = self.store.save_discovery(&discovery) {
            tracing::warn!("Failed to cache discovery: {}", e);
        }
        Ok(discovery)
    }

    async fn discover_live(&self, target: CrawlTarget) -> Result<Discovery> {
        let log = ItemLog::at(self.config.output.log_dir.join(DISCOVERY_LOG));
        let progress = WorkerProgress::new(0, Arc::new(ProgressRegistry::new()));
        let policy = RetryPolicy::new(
            self.config.browser.launch_attempts,
            self.config.crawler.retry_delay(),
        );

        let session = SessionGuard::open(self.sessions.as_ref(), policy, &log).await?;
        let outcome = {
            let mut navigator =
                Navigator::new(session.driver(), &self.config.crawler, &progress, &log);
            navigator.discover(&self.config.portal.url, target).await
        };
        session.close().await;
        outcome
    }

    /// Discover, seed, run every worker to completion and summarize.
    ///
    /// Only a failed discovery aborts the run; per-item failures are
    /// counted in the summary.
    pub async fn run(mut self) -> Result<RunSummary> {
        let discovery = Arc::new(self.discover().await?);
        let total = discovery.items.len();

        let registry = Arc::new(WorkRegistry::new(discovery.items.clone()));
        let done = self.store.persisted_items(
            &discovery.district_name,
            &discovery.taluka_name,
            &discovery.items,
        )?;
        let already_done = registry.seed(done);
        tracing::info!(
            "{} of {} villages in '{}' / '{}' already persisted",
            already_done,
            total,
            discovery.district_name,
            discovery.taluka_name
        );

        let progress = Arc::new(ProgressRegistry::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let view = match self.view.take() {
            Some(view) => Some(view),
            None if self.show_progress => {
                Some(Box::new(IndicatifView::default()) as Box<dyn ProgressView>)
            }
            None => None,
        };
        let reporter = view.map(|view| {
            let store = Arc::clone(&self.store);
            let listed = Arc::clone(&discovery);
            let completed: CompletedCounter = Arc::new(move || {
                store.completed_count(&listed.district_name, &listed.taluka_name, &listed.items)
            });
            Reporter::new(Arc::clone(&progress), completed, total).spawn(view, shutdown_rx)
        });

        let ctx = WorkerContext {
            registry,
            progress,
            sessions: Arc::clone(&self.sessions),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            discovery,
        };
        let workers = self.config.crawler.workers;
        tracing::info!("Starting {} workers", workers);
        let handles: Vec<_> = (1..=workers)
            .map(|id| tokio::spawn(Worker::new(id, ctx.clone()).run()))
            .collect();

        let mut summary = RunSummary {
            total,
            already_done,
            ..RunSummary::default()
        };
        for joined in join_all(handles).await {
            match joined {
                Ok(worker) => {
                    summary.attempted += worker.attempted;
                    summary.persisted += worker.persisted;
                    summary.failed += worker.failed;
                }
                Err(e) => tracing::error!("Worker task ended abnormally: {}", e),
            }
        }

        // No receiver when running without a view
        let _ = shutdown_tx.send(true);
        if let Some(handle) = reporter {
            if let Err(e) = handle.await {
                tracing::warn!("Progress reporter ended abnormally: {}", e);
            }
        }

        tracing::info!(
            "Run finished: {} total, {} already done, {} attempted, {} persisted, {} failed",
            summary.total,
            summary.already_done,
            summary.attempted,
            summary.persisted,
            summary.failed
        );
        Ok(summary)
    }
}
