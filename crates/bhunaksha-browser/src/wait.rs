//! Bounded polling waits over a [`NavigationDriver`].

use crate::driver::{ElementHandle, Locator, NavigationDriver, SelectOption};
use crate::error::{BrowserError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound and polling cadence for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitBounds {
    pub timeout: Duration,
    pub poll: Duration,
}

impl WaitBounds {
    #[must_use]
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }
}

/// Poll `probe` until it yields a value or the bound elapses.
///
/// Transient errors count as "not yet"; any other error aborts the wait.
/// The probe always runs at least once.
pub async fn wait_until<T, F, Fut>(bounds: WaitBounds, what: &str, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + bounds.timeout;
    loop {
        match probe().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) if e.is_transient() => {
                tracing::trace!("waiting for {}: {}", what, e);
            }
            Err(e) => return Err(e),
        }

        if Instant::now() >= deadline {
            return Err(BrowserError::Timeout(format!(
                "{what} not ready after {:?}",
                bounds.timeout
            )));
        }
        tokio::time::sleep(bounds.poll).await;
    }
}

/// Wait until an element is present and return its handle.
pub async fn wait_for_element(
    driver: &dyn NavigationDriver,
    locator: &Locator,
    bounds: WaitBounds,
) -> Result<ElementHandle> {
    wait_until(bounds, &locator.to_string(), || async move {
        driver.find_element(locator).await.map(Some)
    })
    .await
}

/// Wait until a `<select>` holds more than `min_options` entries.
///
/// The element is re-resolved on every poll so a list rebuilt by the page
/// does not leave the wait holding a dead handle.
pub async fn wait_for_options(
    driver: &dyn NavigationDriver,
    locator: &Locator,
    min_options: usize,
    bounds: WaitBounds,
) -> Result<(ElementHandle, Vec<SelectOption>)> {
    let what = format!("{locator} with more than {min_options} options");
    wait_until(bounds, &what, || async move {
        let handle = driver.find_element(locator).await?;
        let options = driver.options_of(&handle).await?;
        Ok((options.len() > min_options).then_some((handle, options)))
    })
    .await
}
