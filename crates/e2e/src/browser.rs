//! Browser capability used by scenarios
//!
//! A [`BrowserPage`] is one page/tab owned by one run. Every wait takes its
//! own timeout; implementations must resolve with [`E2eError::Timeout`]
//! once it elapses.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{E2eError, E2eResult};

#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Open `url` and wait until the network is idle.
    async fn goto(&self, url: &str, timeout: Duration) -> E2eResult<()>;

    /// Wait until an element matching `selector` is visible.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()>;

    async fn click(&self, selector: &str) -> E2eResult<()>;

    /// Rendered text of the first element matching `selector`.
    async fn inner_text(&self, selector: &str) -> E2eResult<String>;

    /// Release the page. Called exactly once per run.
    async fn close(&self) -> E2eResult<()>;
}

/// Grace period on top of a wait's own timeout before the caller gives up
/// on an implementation that never answers.
const WAIT_GRACE: Duration = Duration::from_secs(1);

/// Wait for `selector`, bounded on the caller side as well.
pub async fn bounded_wait(
    page: &dyn BrowserPage,
    selector: &str,
    timeout: Duration,
) -> E2eResult<()> {
    match tokio::time::timeout(timeout + WAIT_GRACE, page.wait_for_selector(selector, timeout)).await
    {
        Ok(result) => result,
        Err(_) => Err(E2eError::Timeout {
            target: selector.to_string(),
            after: timeout,
        }),
    }
}
