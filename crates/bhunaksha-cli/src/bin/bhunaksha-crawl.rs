//! Crawl one taluka of the cadastral portal with a pool of browser workers.

use anyhow::Result;
use bhunaksha_browser::ChromiumSessionFactory;
use bhunaksha_crawler::{IndicatifView, Orchestrator};
use indicatif::MultiProgress;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let multi = MultiProgress::new();
    bhunaksha_cli::init_tracing(&multi);
    info!("Starting bhunaksha-crawl v{}", env!("CARGO_PKG_VERSION"));

    let config = bhunaksha_cli::load_config()?;
    info!(
        "Target district {} taluka {} with {} workers",
        config.portal.district_index, config.portal.taluka_index, config.crawler.workers
    );

    let sessions = Arc::new(ChromiumSessionFactory::new(config.browser.clone()));
    let summary = Orchestrator::new(config, sessions)
        .with_view(Box::new(IndicatifView::new(multi)))
        .run()
        .await?;

    println!(
        "Persisted {} of {} attempted villages ({} already done, {} failed, {} total)",
        summary.persisted, summary.attempted, summary.already_done, summary.failed, summary.total
    );
    Ok(())
}
