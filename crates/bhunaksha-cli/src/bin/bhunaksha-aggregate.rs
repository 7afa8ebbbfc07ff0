//! Summarize harvested village tables into land-holding classes.

use anyhow::{Context, Result};
use bhunaksha_aggregate::{aggregate_district, write_csv};
use indicatif::MultiProgress;
use tracing::info;

fn main() -> Result<()> {
    bhunaksha_cli::init_tracing(&MultiProgress::new());

    let config = bhunaksha_cli::load_config()?;
    let root = bhunaksha_cli::aggregate_root(&config)?;
    info!("Aggregating village tables under {}", root.display());

    let rows = aggregate_district(&root)
        .with_context(|| format!("failed to aggregate {}", root.display()))?;
    write_csv(&rows, &config.output.aggregate_csv)
        .with_context(|| format!("failed to write {}", config.output.aggregate_csv.display()))?;

    println!(
        "Data processing complete. {} villages saved to '{}'.",
        rows.len(),
        config.output.aggregate_csv.display()
    );
    Ok(())
}
