//! Bhunaksha Crawler - parallel harvest orchestration.
//!
//! This crate drives a pool of workers over the portal's five-level
//! dependent-selector hierarchy. Each worker claims one village at a time
//! from a shared registry, walks the hierarchy in its own browser session,
//! iterates the village's plots, parses the detail panel text into parcel
//! records and persists them as one table per village.
//!
//! # Features
//!
//! - Exactly-once claiming across workers, seeded from prior output
//! - Bounded retries with handle re-resolution for transient UI failures
//! - Two-tier change detection (mutation flag, then content diff)
//! - Partial results persisted when an item fails midway
//! - Live per-worker progress rendered off the worker path
//!
//! # Example
//!
//! ```rust,ignore
//! use bhunaksha_browser::ChromiumSessionFactory;
//! use bhunaksha_crawler::Orchestrator;
//! use std::sync::Arc;
//!
//! let config = bhunaksha_core::AppConfig::load_with_env()?;
//! let sessions = Arc::new(ChromiumSessionFactory::new(config.browser.clone()));
//! let summary = Orchestrator::new(config, sessions).run().await?;
//! println!("persisted {} villages", summary.persisted);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod item_log;
pub mod navigator;
pub mod orchestrator;
pub mod output;
pub mod parser;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod waiter;
pub mod worker;

// Re-export commonly used types
pub use error::{CrawlError, ErrorClass, Result};
pub use item_log::ItemLog;
pub use navigator::{Discovery, NavState, Navigator};
pub use orchestrator::{Orchestrator, RunSummary};
pub use output::OutputStore;
pub use parser::parse_block;
pub use progress::{
    CompletedCounter, IndicatifView, ProgressEntry, ProgressFrame, ProgressRegistry, ProgressView,
    Reporter, WorkerId, WorkerProgress,
};
pub use registry::WorkRegistry;
pub use retry::{Attempt, RetryPolicy};
pub use waiter::ChangeWaiter;
pub use worker::{SessionGuard, Worker, WorkerContext, WorkerSummary};
