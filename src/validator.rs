//! Live validation of a persisted session snapshot.
//!
//! The validator answers one question: does this snapshot still
//! authenticate against the running application? It launches an isolated,
//! disposable browser context (never one used by actual tests), restores
//! the snapshot before navigation, and reads a small set of heuristic
//! signals. The check is intentionally permissive: false negatives just
//! trigger a fresh login, while false positives would let a broken run
//! proceed blind - so the absence of login-page indicators is the hard
//! gate and presence-of-content is only corroborating evidence.

use log::{debug, info, warn};

use crate::browser::{BrowserHandle, BrowserLauncher};
use crate::config::{AppDescriptor, SessionConfig};
use crate::error::SessionResult;
use crate::snapshot::codec::{self, RestoreOptions};
use crate::snapshot::StorageSnapshot;

const NAV_SELECTOR: &str = ".sidebar, nav, [role=\"navigation\"]";

/// Reads the corroborating signals the original validation script checked:
/// the client/entity selections the portal writes to local storage, and
/// session-storage population.
const VALIDATION_SIGNALS_JS: &str = r#"(() => {
  const clientSelection = localStorage.getItem('client_selection');
  const entitySelection = localStorage.getItem('entity_selection');
  const hasLocalStorageData =
    !!clientSelection && !!entitySelection &&
    clientSelection !== 'null' && entitySelection !== 'null';
  return {
    hasLocalStorageData,
    sessionStorageKeys: Object.keys(sessionStorage).length
  };
})()"#;

/// Transient validation result; consumed once, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub is_on_login_page: bool,
    pub has_navigation: bool,
    pub has_local_storage_data: bool,
    pub has_session_storage_data: bool,
    pub observed_url: String,
}

impl ValidationVerdict {
    /// Apply the verdict predicate. Being on a login page dominates: no
    /// number of structural-presence signals can make such a session valid.
    pub fn compute(
        is_on_login_page: bool,
        has_navigation: bool,
        has_local_storage_data: bool,
        has_session_storage_data: bool,
        observed_url: String,
    ) -> Self {
        Self {
            is_valid: !is_on_login_page && (has_navigation || has_local_storage_data),
            is_on_login_page,
            has_navigation,
            has_local_storage_data,
            has_session_storage_data,
            observed_url,
        }
    }

    /// Verdict for a probe that crashed: evidence of invalidity, not a
    /// failure to propagate.
    fn inconclusive() -> Self {
        Self::compute(false, false, false, false, "unknown".to_string())
    }
}

pub struct SessionValidator<'a> {
    launcher: &'a dyn BrowserLauncher,
    descriptor: &'a AppDescriptor,
    config: &'a SessionConfig,
}

impl<'a> SessionValidator<'a> {
    pub fn new(
        launcher: &'a dyn BrowserLauncher,
        descriptor: &'a AppDescriptor,
        config: &'a SessionConfig,
    ) -> Self {
        Self {
            launcher,
            descriptor,
            config,
        }
    }

    /// Probe the snapshot against the live application. Never mutates the
    /// snapshot; any internal error collapses to an invalid verdict.
    pub async fn validate(&self, snapshot: &StorageSnapshot) -> ValidationVerdict {
        info!("Testing existing session for {}", self.descriptor.app);
        match self.probe(snapshot).await {
            Ok(verdict) => {
                if verdict.is_valid {
                    info!("Session is valid - authenticated at {}", verdict.observed_url);
                } else {
                    info!(
                        "Session is invalid (onLogin={}, nav={}, localStorage={}) at {}",
                        verdict.is_on_login_page,
                        verdict.has_navigation,
                        verdict.has_local_storage_data,
                        verdict.observed_url
                    );
                }
                verdict
            }
            Err(e) => {
                warn!("Session validation failed: {e}");
                ValidationVerdict::inconclusive()
            }
        }
    }

    async fn probe(&self, snapshot: &StorageSnapshot) -> SessionResult<ValidationVerdict> {
        let mut handle = self.launcher.launch(true).await?;
        let verdict = self.probe_in(handle.as_ref(), snapshot).await;
        // The context is disposable and must go away on every exit path.
        if let Err(e) = handle.close().await {
            warn!("Failed to close validation context: {e}");
        }
        verdict
    }

    async fn probe_in(
        &self,
        handle: &dyn BrowserHandle,
        snapshot: &StorageSnapshot,
    ) -> SessionResult<ValidationVerdict> {
        let page = handle.new_page().await?;

        // Restore before first navigation so the app sees its tokens
        // immediately on bootstrap.
        codec::restore_best_effort(
            snapshot,
            page.as_ref(),
            &self.descriptor.origin(),
            &RestoreOptions::quiet(),
        )
        .await;

        page.navigate(&self.descriptor.base_url).await?;
        tokio::time::sleep(self.config.validation_settle).await;

        let observed_url = page.current_url().await?;
        if self.descriptor.is_login_url(&observed_url) {
            debug!("Redirected to auth immediately: {observed_url}");
            return Ok(ValidationVerdict::compute(
                true,
                false,
                false,
                false,
                observed_url,
            ));
        }

        let has_navigation = page
            .wait_for_visible(NAV_SELECTOR, self.config.nav_probe_timeout)
            .await
            .unwrap_or(false);

        let signals = page.evaluate(VALIDATION_SIGNALS_JS).await?;
        let has_local_storage_data = signals
            .get("hasLocalStorageData")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let session_storage_keys = signals
            .get("sessionStorageKeys")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        Ok(ValidationVerdict::compute(
            false,
            has_navigation,
            has_local_storage_data,
            session_storage_keys > 0,
            observed_url,
        ))
    }
}
