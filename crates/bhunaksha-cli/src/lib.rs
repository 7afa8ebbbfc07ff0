//! Shared setup for the `bhunaksha-crawl` and `bhunaksha-aggregate` binaries.

use anyhow::{anyhow, Context, Result};
use bhunaksha_core::AppConfig;
use bhunaksha_crawler::OutputStore;
use indicatif::MultiProgress;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

/// Install the global tracing subscriber.
///
/// Events go to stderr through `multi`, so they land above any live
/// progress bars instead of inside them. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing(multi: &MultiProgress) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bhunaksha=debug"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(ProgressLogWriter::stderr(multi.clone())),
        )
        .with(filter)
        .init();
}

type Sink = Arc<Mutex<dyn Write + Send>>;

/// Log writer that hides the progress bars while a line is written.
#[derive(Clone)]
pub struct ProgressLogWriter {
    multi: MultiProgress,
    sink: Sink,
}

impl ProgressLogWriter {
    /// Write to stderr.
    #[must_use]
    pub fn stderr(multi: MultiProgress) -> Self {
        Self::new(multi, Arc::new(Mutex::new(io::stderr())))
    }

    /// Write to an arbitrary sink.
    #[must_use]
    pub fn new(multi: MultiProgress, sink: Sink) -> Self {
        Self { multi, sink }
    }
}

impl<'a> MakeWriter<'a> for ProgressLogWriter {
    type Writer = BufferedEvent;

    fn make_writer(&'a self) -> Self::Writer {
        BufferedEvent {
            multi: self.multi.clone(),
            sink: Arc::clone(&self.sink),
            buf: Vec::new(),
        }
    }
}

/// One formatted event, flushed to the sink on drop.
pub struct BufferedEvent {
    multi: MultiProgress,
    sink: Sink,
    buf: Vec<u8>,
}

impl Write for BufferedEvent {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.buf);
        let sink = &self.sink;
        self.multi.suspend(|| {
            let mut out = sink.lock().unwrap_or_else(PoisonError::into_inner);
            out.write_all(&buf)?;
            out.flush()
        })
    }
}

impl Drop for BufferedEvent {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Load configuration from the config file and environment.
pub fn load_config() -> Result<AppConfig> {
    AppConfig::load_with_env().context("failed to load configuration")
}

/// District folder the aggregator should read.
///
/// An explicit `aggregate_root` wins; otherwise the folder of the cached
/// discovery for the configured target is used.
pub fn aggregate_root(config: &AppConfig) -> Result<PathBuf> {
    if let Some(root) = &config.output.aggregate_root {
        return Ok(root.clone());
    }

    let store = OutputStore::new(config.output.data_dir.clone());
    let discovery = store
        .load_discovery(config.target())
        .context("failed to read the discovery cache")?
        .ok_or_else(|| {
            anyhow!(
                "no discovery cached under {}; run bhunaksha-crawl first or set output.aggregate_root",
                store.root().display()
            )
        })?;
    Ok(store.district_dir(&discovery.district_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bhunaksha_core::WorkItem;
    use bhunaksha_crawler::Discovery;
    use indicatif::{ProgressBar, ProgressDrawTarget};
    use tempfile::TempDir;

    #[test]
    fn test_log_lines_are_written_whole_per_event() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let bar = multi.add(ProgressBar::new(4));
        bar.set_position(2);

        let captured = Arc::new(Mutex::new(Vec::<u8>::new()));
        let writers = ProgressLogWriter::new(multi, captured.clone());

        let mut event = writers.make_writer();
        event.write_all(b"INFO worker 1: ").expect("write");
        assert!(captured.lock().expect("sink").is_empty());
        event.write_all(b"claimed 0100 Wadgaon\n").expect("write");
        drop(event);

        let mut other = writers.make_writer();
        other.write_all(b"WARN retry\n").expect("write");
        drop(other);

        let text = String::from_utf8(captured.lock().expect("sink").clone()).expect("utf8");
        assert_eq!(text, "INFO worker 1: claimed 0100 Wadgaon\nWARN retry\n");
        assert_eq!(bar.position(), 2);
    }

    #[test]
    fn test_explicit_aggregate_root_wins() {
        let mut config = AppConfig::default();
        config.output.aggregate_root = Some(PathBuf::from("/data/07 Amravati"));
        assert_eq!(
            aggregate_root(&config).expect("root"),
            PathBuf::from("/data/07 Amravati")
        );
    }

    #[test]
    fn test_aggregate_root_from_discovery_cache() {
        let tmp = TempDir::new().expect("temp dir");
        let mut config = AppConfig::default();
        config.output.data_dir = tmp.path().to_path_buf();
        assert!(aggregate_root(&config).is_err());

        let store = OutputStore::new(tmp.path());
        store
            .save_discovery(&Discovery::new(
                config.target(),
                "07 Amravati",
                "03 Achalpur",
                vec![WorkItem::new(1, "A")],
            ))
            .expect("cache");

        assert_eq!(
            aggregate_root(&config).expect("root"),
            tmp.path().join("07 Amravati")
        );
    }
}
