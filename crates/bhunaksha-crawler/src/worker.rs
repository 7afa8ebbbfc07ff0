//! Worker loop: claim, navigate, persist, repeat.

use crate::error::{CrawlError, Result};
use crate::item_log::ItemLog;
use crate::navigator::{Discovery, Navigator};
use crate::output::OutputStore;
use crate::progress::{ProgressRegistry, WorkerId, WorkerProgress};
use crate::registry::WorkRegistry;
use crate::retry::RetryPolicy;
use bhunaksha_browser::{NavigationDriver, SessionFactory};
use bhunaksha_core::{AppConfig, ItemResult, WorkItem};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Owns one open navigation session and closes it exactly once.
///
/// Call [`SessionGuard::close`] on every normal path. If the guard is
/// dropped without it (panic, task abort), a close is spawned on the
/// current runtime.
pub struct SessionGuard {
    driver: Arc<dyn NavigationDriver>,
    closed: bool,
}

impl SessionGuard {
    /// Take ownership of an open session.
    #[must_use]
    pub fn new(driver: Box<dyn NavigationDriver>) -> Self {
        Self {
            driver: Arc::from(driver),
            closed: false,
        }
    }

    /// Open a session, retrying failed launches within `policy`.
    pub async fn open(
        sessions: &dyn SessionFactory,
        policy: RetryPolicy,
        log: &ItemLog,
    ) -> Result<Self> {
        let max_attempts = policy.max_attempts.max(1);
        policy
            .run(
                "browser launch",
                |_| true,
                |attempt, e| {
                    log.record(format!(
                        "Error initializing browser on attempt {attempt}/{max_attempts}: {e}"
                    ));
                },
                |_| async move {
                    let driver = sessions.open_session().await.map_err(CrawlError::from)?;
                    Ok::<_, CrawlError>(Self::new(driver))
                },
            )
            .await
    }

    /// The guarded session.
    #[must_use]
    pub fn driver(&self) -> &dyn NavigationDriver {
        self.driver.as_ref()
    }

    /// Close the session, logging a failure to do so.
    pub async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.driver.close().await {
            tracing::warn!("Failed to close navigation session: {}", e);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let driver = Arc::clone(&self.driver);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = driver.close().await {
                        tracing::warn!("Failed to close abandoned session: {}", e);
                    }
                });
            }
            Err(_) => tracing::warn!("Navigation session dropped outside a runtime"),
        }
    }
}

/// Everything a worker shares with its peers.
#[derive(Clone)]
pub struct WorkerContext {
    /// Claimable work
    pub registry: Arc<WorkRegistry>,
    /// Live status of all workers
    pub progress: Arc<ProgressRegistry>,
    /// Source of fresh navigation sessions
    pub sessions: Arc<dyn SessionFactory>,
    /// Persisted output
    pub store: Arc<OutputStore>,
    /// Run settings
    pub config: Arc<AppConfig>,
    /// Work list and ancestor labels
    pub discovery: Arc<Discovery>,
}

/// What one worker did during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Worker identity
    pub worker_id: WorkerId,
    /// Items claimed and attempted
    pub attempted: usize,
    /// Items with a table written (complete or partial)
    pub persisted: usize,
    /// Items whose navigation ended in an error
    pub failed: usize,
}

/// Outcome of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Complete,
    Partial,
    Failed,
}

/// One member of the pool.
pub struct Worker {
    id: WorkerId,
    ctx: WorkerContext,
    progress: WorkerProgress,
}

impl Worker {
    /// Create a worker bound to the shared context.
    #[must_use]
    pub fn new(id: WorkerId, ctx: WorkerContext) -> Self {
        let progress = WorkerProgress::new(id, Arc::clone(&ctx.progress));
        Self { id, ctx, progress }
    }

    /// Claim and process items until the registry is exhausted.
    pub async fn run(self) -> WorkerSummary {
        let mut summary = WorkerSummary {
            worker_id: self.id,
            ..WorkerSummary::default()
        };

        while let Some(item) = self.ctx.registry.claim() {
            let span = tracing::info_span!("item", worker = self.id, village = %item.name);
            let outcome = self.process(&item).instrument(span).await;

            summary.attempted += 1;
            match outcome {
                ItemOutcome::Complete => summary.persisted += 1,
                ItemOutcome::Partial => {
                    summary.persisted += 1;
                    summary.failed += 1;
                }
                ItemOutcome::Failed => summary.failed += 1,
            }
            self.progress.clear();
        }

        tracing::debug!("Worker {} finished: {:?}", self.id, summary);
        summary
    }

    async fn process(&self, item: &WorkItem) -> ItemOutcome {
        let config = &self.ctx.config;
        let discovery = &self.ctx.discovery;
        let log = ItemLog::for_item(&config.output.log_dir, discovery.target, item);
        let started = Instant::now();
        self.progress.begin("Start");

        let session = match self.open_session(&log).await {
            Ok(session) => session,
            Err(e) => {
                log.record(format!("Error encountered: {e}"));
                log.record(format!("Script completed for village '{}'", item.name));
                return ItemOutcome::Failed;
            }
        };

        let mut result = ItemResult::new();
        let navigation = {
            let mut navigator =
                Navigator::new(session.driver(), &config.crawler, &self.progress, &log);
            navigator
                .run_item(&config.portal.url, discovery, item, &mut result)
                .await
        };
        session.close().await;

        result.dedup();
        let outcome = match (&navigation, result.is_empty()) {
            (Ok(()), _) => ItemOutcome::Complete,
            (Err(_), false) => ItemOutcome::Partial,
            (Err(_), true) => ItemOutcome::Failed,
        };

        let outcome = if outcome == ItemOutcome::Failed {
            outcome
        } else {
            match self.persist(item, &result) {
                Ok(()) => {
                    log.record(format!("Village '{}' processed", item.name));
                    outcome
                }
                Err(e) => {
                    log.record(format!("Failed to persist village '{}': {e}", item.name));
                    ItemOutcome::Failed
                }
            }
        };

        log.record(format!(
            "Time taken for village '{}': {:.1?}",
            item.name,
            started.elapsed()
        ));
        log.record(format!("Script completed for village '{}'", item.name));
        outcome
    }

    async fn open_session(&self, log: &ItemLog) -> Result<SessionGuard> {
        let config = &self.ctx.config;
        let policy = RetryPolicy::new(config.browser.launch_attempts, config.crawler.retry_delay());
        SessionGuard::open(self.ctx.sessions.as_ref(), policy, log).await
    }

    fn persist(&self, item: &WorkItem, result: &ItemResult) -> Result<()> {
        let discovery = &self.ctx.discovery;
        let path = self.ctx.store.write(
            &discovery.district_name,
            &discovery.taluka_name,
            &item.name,
            result,
        )?;
        tracing::info!("Persisted {} records to {}", result.len(), path.display());
        Ok(())
    }
}
