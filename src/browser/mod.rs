//! The browser-driver seam.
//!
//! Everything above this module (login driver, validator, manager) speaks to
//! the browser exclusively through these traits, so the whole session state
//! machine is exercised in tests against the in-memory mock driver while
//! production runs use the CDP implementation.

#[cfg(feature = "chromium")]
pub mod chromium;
#[cfg(feature = "mock")]
pub mod mock;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SessionResult;
use crate::snapshot::Cookie;

/// One open page/tab inside a browsing context.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate to `url` and wait for the document to load.
    async fn navigate(&self, url: &str) -> SessionResult<()>;

    /// The URL the page is currently on.
    async fn current_url(&self) -> SessionResult<String>;

    /// Wait until an element matching the CSS `selector` is visible.
    ///
    /// Returns `Ok(false)` when the timeout elapses with the element still
    /// absent - for optional probes (the MFA field, readiness landmarks)
    /// that is a legitimate outcome, not an error. `Err` is reserved for
    /// driver failures, keeping "legitimately absent" and "crashed while
    /// checking" distinguishable.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> SessionResult<bool>;

    /// Fill an input matching `selector` with `value`.
    async fn fill(&self, selector: &str, value: &str) -> SessionResult<()>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> SessionResult<()>;

    /// Evaluate a JavaScript expression and return its JSON value.
    async fn evaluate(&self, expression: &str) -> SessionResult<serde_json::Value>;

    /// Register a script that runs before any page script on every future
    /// navigation. This is the only correct hook for storage restoration:
    /// the application reads storage synchronously on bootstrap.
    async fn add_init_script(&self, script: &str) -> SessionResult<()>;

    /// Install cookies into the browsing context.
    async fn set_cookies(&self, cookies: &[Cookie]) -> SessionResult<()>;

    /// Read all cookies from the browsing context.
    async fn cookies(&self) -> SessionResult<Vec<Cookie>>;
}

/// A launched browser holding one or more pages. Must be closed on every
/// exit path; validation contexts in particular are disposable.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> SessionResult<Box<dyn BrowserPage>>;

    async fn close(&mut self) -> SessionResult<()>;
}

/// Launches browser instances. The session manager owns one launcher and
/// opens short-lived handles for validation and regeneration.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, headless: bool) -> SessionResult<Box<dyn BrowserHandle>>;
}
