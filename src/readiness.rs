//! Application readiness probing.
//!
//! Readiness is advisory, not a hard gate: a false negative here must not
//! abort an otherwise-successful login, so every probe is bounded and the
//! worst outcome is `Unconfirmed`, never an error.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::browser::BrowserPage;
use crate::error::SessionResult;

/// Structural landmarks tried in order; the first one that becomes visible
/// is treated as evidence the application shell finished bootstrapping.
pub const LANDMARKS: [&str; 4] = [
    "router-outlet",
    "[role=\"main\"]",
    "app-root:not([hidden])",
    ".sidebar, nav",
];

/// Which signal, if any, confirmed readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// One of the structural landmarks became visible.
    Landmark(&'static str),
    /// Only the last-resort check passed: body visible, no error markers.
    BodyFallback,
    /// Nothing confirmed readiness; the flow proceeds anyway.
    Unconfirmed,
}

#[derive(Debug, Clone)]
pub struct ReadinessOptions {
    /// Budget for each landmark probe.
    pub per_landmark_timeout: Duration,
    /// Budget for the body fallback check.
    pub fallback_timeout: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            per_landmark_timeout: Duration::from_secs(5),
            fallback_timeout: Duration::from_secs(10),
        }
    }
}

/// Probe the page for readiness signals.
///
/// Driver errors during an individual probe demote that probe to "absent"
/// rather than failing the flow; only the outcome is reported.
pub async fn await_ready(
    page: &dyn BrowserPage,
    options: &ReadinessOptions,
) -> SessionResult<Readiness> {
    for landmark in LANDMARKS {
        match page
            .wait_for_visible(landmark, options.per_landmark_timeout)
            .await
        {
            Ok(true) => {
                info!("Application ready - found visible element: {landmark}");
                return Ok(Readiness::Landmark(landmark));
            }
            Ok(false) => {}
            Err(e) => debug!("landmark probe {landmark} failed: {e}"),
        }
    }

    debug!("No landmark visible, trying body fallback");
    match page.wait_for_visible("body", options.fallback_timeout).await {
        Ok(true) => {
            let body_text = page
                .evaluate("document.body ? document.body.innerText : ''")
                .await
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            if !body_text.contains("Error") && !body_text.contains("404") {
                info!("Basic application structure appears ready");
                return Ok(Readiness::BodyFallback);
            }
        }
        Ok(false) => {}
        Err(e) => debug!("body fallback probe failed: {e}"),
    }

    info!("Readiness unconfirmed - proceeding anyway");
    Ok(Readiness::Unconfirmed)
}

/// Wait until session storage looks populated (the application writes a
/// handful of auth entries during bootstrap). Advisory; returns whether the
/// heuristic passed within `timeout`, re-checking every `poll_interval`.
pub async fn storage_initialized(
    page: &dyn BrowserPage,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let populated = page
            .evaluate("Object.keys(sessionStorage).length > 5")
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if populated {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}
