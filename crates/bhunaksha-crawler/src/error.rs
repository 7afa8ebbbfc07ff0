//! Crawl error types and their failure classes.

use crate::navigator::NavState;
use bhunaksha_browser::BrowserError;
use thiserror::Error;

/// How a failure affects the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Stale handle, obstructed or not-yet-present element; retry after re-resolving
    TransientUi,
    /// A bounded wait was exceeded
    Timeout,
    /// Abort the current work item only
    TerminalPerItem,
    /// The navigation session is unusable; close it and move on
    SessionFatal,
}

/// Errors raised while crawling.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Failure reported by the navigation driver
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// A bounded wait ended without the expected change
    #[error("Timed out waiting for {what}")]
    Timeout {
        /// What was being waited for
        what: String,
    },

    /// A dropdown never offered more than its placeholder
    #[error("Dropdown {level} has no selectable options")]
    EmptyDropdown {
        /// Selector level or plot list
        level: String,
    },

    /// The requested option is not (or no longer) in the list
    #[error("Option {choice} not found in {level}")]
    OptionNotFound {
        /// Selector level or plot list
        level: String,
        /// Requested index or label
        choice: String,
    },

    /// The portal rendered no map layer for the village
    #[error("Map layer not loaded for village '{village}'")]
    MapNotLoaded {
        /// Village label
        village: String,
    },

    /// The navigator was driven out of order
    #[error("Invalid navigation transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state
        from: NavState,
        /// Requested state
        to: NavState,
    },

    /// The work list could not be produced
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tabular output failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Discovery cache encoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrawlError {
    /// Failure class of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            CrawlError::Browser(e) if e.is_transient() => ErrorClass::TransientUi,
            CrawlError::Browser(BrowserError::Timeout(_)) | CrawlError::Timeout { .. } => {
                ErrorClass::Timeout
            }
            CrawlError::Browser(BrowserError::ScriptError(_)) => ErrorClass::TerminalPerItem,
            CrawlError::Browser(_) | CrawlError::Discovery(_) => ErrorClass::SessionFatal,
            CrawlError::EmptyDropdown { .. }
            | CrawlError::OptionNotFound { .. }
            | CrawlError::MapNotLoaded { .. }
            | CrawlError::InvalidTransition { .. }
            | CrawlError::Io(_)
            | CrawlError::Csv(_)
            | CrawlError::Json(_) => ErrorClass::TerminalPerItem,
        }
    }

    /// Whether the retry executor should try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::TransientUi
    }
}

/// Result type alias using `CrawlError`.
pub type Result<T> = std::result::Result<T, CrawlError>;
