use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("script failed: {0}")]
    ScriptError(String),

    #[error("session already closed")]
    SessionClosed,
}

impl BrowserError {
    /// Whether the failure is a transient UI condition that a fresh lookup
    /// of the same element may clear.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrowserError::ElementNotFound(_)
                | BrowserError::StaleElement(_)
                | BrowserError::ClickIntercepted(_)
        )
    }
}
