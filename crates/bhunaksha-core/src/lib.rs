//! Bhunaksha Core - Foundation crate for the cadastral land-record harvester.
//!
//! This crate provides shared types, error handling and configuration
//! management that the browser, crawler and aggregation crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Configuration errors using thiserror
//! - [`config`] - TOML-based configuration with platform paths and env overrides
//! - [`types`] - Work items, parcel records and the selector hierarchy
//! - [`naming`] - Reversible file-system names for portal labels
//!
//! # Example
//!
//! ```rust
//! use bhunaksha_core::{AppConfig, WorkItem};
//!
//! let config = AppConfig::default();
//! assert!(config.crawler.workers > 0);
//!
//! let item = WorkItem::new(3, "0300 Wadgaon");
//! assert_eq!(item.name, "0300 Wadgaon");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

// Re-export commonly used types
pub use config::{AppConfig, BrowserConfig, CrawlerConfig, OutputConfig, PortalConfig};
pub use error::{ConfigError, ConfigResult};
pub use naming::{file_stem, label_of};
pub use types::{CrawlTarget, ItemResult, ParcelRecord, SelectionLevel, WorkItem};
