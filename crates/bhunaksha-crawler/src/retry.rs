//! Bounded retry with a fixed pause between attempts.

use crate::error::{CrawlError, Result};
use std::future::Future;
use std::time::Duration;

/// Outcome of one attempt, tagged for the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The operation produced a value
    Success(T),
    /// The operation failed in a way a fresh attempt may fix
    Retryable(CrawlError),
    /// The operation failed for good
    Fatal(CrawlError),
}

impl<T> Attempt<T> {
    /// Tag a raw result using `is_retryable`.
    pub fn classify(result: Result<T>, is_retryable: impl Fn(&CrawlError) -> bool) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) if is_retryable(&e) => Attempt::Retryable(e),
            Err(e) => Attempt::Fatal(e),
        }
    }
}

/// Attempt budget and pause between attempts.
///
/// The operation is handed the 1-based attempt number and must resolve
/// every element handle it uses on each call: a retryable failure means
/// handles from the previous attempt can no longer be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause after a retryable failure
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Run `op` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// `on_retry` is told about every retryable failure that will be
    /// retried, before the pause. The last error is returned when the
    /// budget runs out.
    pub async fn run<T, Op, Fut>(
        &self,
        what: &str,
        is_retryable: impl Fn(&CrawlError) -> bool,
        mut on_retry: impl FnMut(u32, &CrawlError),
        mut op: Op,
    ) -> Result<T>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match Attempt::classify(op(attempt).await, &is_retryable) {
                Attempt::Success(value) => return Ok(value),
                Attempt::Fatal(e) => return Err(e),
                Attempt::Retryable(e) if attempt >= max_attempts => {
                    tracing::warn!("{} failed after {} attempts: {}", what, attempt, e);
                    return Err(e);
                }
                Attempt::Retryable(e) => {
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        what,
                        attempt,
                        max_attempts,
                        self.delay,
                        e
                    );
                    on_retry(attempt, &e);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
