//! Change detection for the plot detail panel.
//!
//! The panel is refreshed asynchronously after a plot is chosen and the
//! page exposes no ready event. Before the selection, [`ChangeWaiter::arm`]
//! installs a `MutationObserver` that flips a window flag on any child-list
//! change under the panel. [`ChangeWaiter::await_change`] then polls the
//! flag within a bound. If the flag never flips, the panel text is compared
//! with the previously recorded text: a difference means the mutation
//! landed before the observer saw it, so the new text is accepted.

use crate::error::{CrawlError, Result};
use bhunaksha_browser::{wait_until, BrowserError, Locator, NavigationDriver, WaitBounds};

/// Window property flipped by the observer.
pub const UPDATE_FLAG: &str = "__bhunakshaPanelUpdated";

/// Window property holding the observer, so re-arming can disconnect it.
pub const OBSERVER_SLOT: &str = "__bhunakshaPanelObserver";

/// Watches one page region for content updates.
#[derive(Debug, Clone)]
pub struct ChangeWaiter {
    region: Locator,
    bounds: WaitBounds,
}

impl ChangeWaiter {
    /// Watch `region`, waiting at most `bounds.timeout` per change.
    #[must_use]
    pub fn new(region: Locator, bounds: WaitBounds) -> Self {
        Self { region, bounds }
    }

    fn arm_script(&self) -> Result<String> {
        let selector = serde_json::to_string(&self.region.to_css())?;
        Ok(format!(
            "(() => {{ \
                if (window.{OBSERVER_SLOT}) {{ window.{OBSERVER_SLOT}.disconnect(); }} \
                window.{UPDATE_FLAG} = false; \
                const target = document.querySelector({selector}); \
                if (!target) {{ return false; }} \
                window.{OBSERVER_SLOT} = new MutationObserver((mutations) => {{ \
                    if (mutations.some((m) => m.type === 'childList')) {{ window.{UPDATE_FLAG} = true; }} \
                }}); \
                window.{OBSERVER_SLOT}.observe(target, {{ childList: true, subtree: true }}); \
                return true; \
            }})()"
        ))
    }

    /// Install a fresh observer and reset the flag.
    ///
    /// Returns `false` when the region is not on the page yet; the
    /// content-diff fallback still applies in that case.
    pub async fn arm(&self, driver: &dyn NavigationDriver) -> Result<bool> {
        let armed = driver.execute_script(&self.arm_script()?).await?;
        Ok(armed.as_bool().unwrap_or(false))
    }

    /// Block until the region changed and return its text.
    ///
    /// Fails with [`CrawlError::Timeout`] when neither the flag flipped nor
    /// the text differs from `previous`.
    pub async fn await_change(&self, driver: &dyn NavigationDriver, previous: &str) -> Result<String> {
        let check = format!("window.{UPDATE_FLAG} === true");
        let flagged = wait_until(self.bounds, "detail panel update", || {
            let check = check.as_str();
            async move {
                let value = driver.execute_script(check).await?;
                Ok(value.as_bool().unwrap_or(false).then_some(()))
            }
        })
        .await;

        match flagged {
            Ok(()) => self.read_region(driver).await,
            Err(BrowserError::Timeout(_)) => {
                let current = match self.read_region(driver).await {
                    Ok(text) => text,
                    Err(e) if e.is_retryable() => String::new(),
                    Err(e) => return Err(e),
                };
                if current != previous && !current.is_empty() {
                    tracing::debug!("mutation signal missed, accepting changed content");
                    Ok(current)
                } else {
                    Err(CrawlError::Timeout {
                        what: format!("update of {}", self.region),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Block until the region text is non-empty and differs from `previous`.
    ///
    /// Used when [`arm`](Self::arm) failed and the flag may still be set by
    /// an earlier change.
    pub async fn await_content_change(
        &self,
        driver: &dyn NavigationDriver,
        previous: &str,
    ) -> Result<String> {
        let changed = wait_until(self.bounds, "detail panel content", || async move {
            let handle = driver.find_element(&self.region).await?;
            let text = driver.read_text(&handle).await?;
            Ok((!text.is_empty() && text != previous).then_some(text))
        })
        .await;

        match changed {
            Ok(text) => Ok(text),
            Err(BrowserError::Timeout(_)) => Err(CrawlError::Timeout {
                what: format!("update of {}", self.region),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_region(&self, driver: &dyn NavigationDriver) -> Result<String> {
        let handle = driver.find_element(&self.region).await?;
        Ok(driver.read_text(&handle).await?)
    }
}
