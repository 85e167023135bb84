//! The session manager - the authoritative decision state machine.
//!
//! One explicitly constructed manager per target application; callers hold
//! the reference, so two applications can coexist in one test process
//! without shared global state. `ensure_session` is the single entry point
//! the page-object layer calls before driving any page, and
//! `restore_session_storage` is the per-page bootstrap that must run before
//! a page's first navigation.
//!
//! The on-disk artifact is shared across workers with last-writer-wins
//! discipline and no locking: regeneration is rare, each write is a full
//! overwrite of a self-consistent document, and a concurrent double
//! regeneration is wasteful but not corrupting.

use log::{info, warn};

use crate::browser::{BrowserHandle, BrowserLauncher, BrowserPage};
use crate::config::{AppDescriptor, SessionConfig, TargetApp};
use crate::credentials::{self, CredentialSet};
use crate::error::SessionResult;
use crate::login::LoginFlowDriver;
use crate::snapshot::codec::{self, RestoreOptions};
use crate::snapshot::StorageSnapshot;
use crate::validator::SessionValidator;

/// States of the session-acquisition machine.
///
/// ```text
/// NoSnapshot        --(artifact absent)--------> Regenerating
/// FreshByAge        --(age < freshness window)-> Ready        [skips validation]
/// PendingValidation --(validate())------------>  Valid | Invalid
/// Valid             ----------------------------> Ready
/// Invalid           ----------------------------> Regenerating
/// Regenerating      --(login success)---------->  Ready
/// Regenerating      --(login failure)---------->  fatal, propagated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSnapshot,
    FreshByAge,
    PendingValidation,
    Valid,
    Invalid,
    Regenerating,
    Ready,
}

pub struct SessionManager {
    descriptor: AppDescriptor,
    config: SessionConfig,
    launcher: Box<dyn BrowserLauncher>,
    credentials_override: Option<CredentialSet>,
    transitions: Vec<SessionState>,
}

impl SessionManager {
    pub fn new(
        descriptor: AppDescriptor,
        config: SessionConfig,
        launcher: Box<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            descriptor,
            config,
            launcher,
            credentials_override: None,
            transitions: Vec::new(),
        }
    }

    /// Use pre-resolved credentials instead of the environment. Intended
    /// for harnesses that resolve credentials through their own channel.
    pub fn with_credentials(mut self, credentials: CredentialSet) -> Self {
        self.credentials_override = Some(credentials);
        self
    }

    /// Construct for `app` with descriptor and defaults resolved from the
    /// environment.
    pub fn for_app(app: TargetApp, launcher: Box<dyn BrowserLauncher>) -> SessionResult<Self> {
        let descriptor = AppDescriptor::resolve(app)?;
        Ok(Self::new(descriptor, SessionConfig::default(), launcher))
    }

    pub fn descriptor(&self) -> &AppDescriptor {
        &self.descriptor
    }

    /// The states traversed by the most recent `ensure_session` or
    /// `create_new_session` call, in order.
    pub fn last_transitions(&self) -> &[SessionState] {
        &self.transitions
    }

    fn record(&mut self, state: SessionState) {
        self.transitions.push(state);
    }

    /// Acquire a usable session: reuse -> validate -> regenerate.
    ///
    /// Idempotent and safe to call at the start of every test or once per
    /// suite; when the artifact is fresh this is a cheap no-op with zero
    /// browser launches.
    pub async fn ensure_session(&mut self) -> SessionResult<()> {
        self.transitions.clear();
        info!("Starting session management for {}", self.descriptor.app);

        match codec::artifact_age(&self.descriptor.snapshot_path) {
            Some(age) if age < self.config.freshness_window => {
                info!(
                    "Recent session artifact ({}s old) - skipping validation",
                    age.as_secs()
                );
                self.record(SessionState::FreshByAge);
                self.record(SessionState::Ready);
                return Ok(());
            }
            Some(_) => {
                self.record(SessionState::PendingValidation);
                match codec::load(&self.descriptor.snapshot_path) {
                    Ok(snapshot) => {
                        let validator = SessionValidator::new(
                            self.launcher.as_ref(),
                            &self.descriptor,
                            &self.config,
                        );
                        let verdict = validator.validate(&snapshot).await;
                        if verdict.is_valid {
                            self.record(SessionState::Valid);
                            self.record(SessionState::Ready);
                            return Ok(());
                        }
                        self.record(SessionState::Invalid);
                    }
                    // A damaged cache is not a reason to fail the run.
                    Err(e) if e.is_snapshot_miss() => {
                        warn!("Unusable snapshot artifact: {e}");
                        self.record(SessionState::Invalid);
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                info!("No session artifact found");
                self.record(SessionState::NoSnapshot);
            }
        }

        self.regenerate().await
    }

    /// Force a fresh login regardless of artifact state - the escape hatch
    /// test bootstraps use when a restored session turns out dead.
    pub async fn create_new_session(&mut self) -> SessionResult<()> {
        self.transitions.clear();
        self.regenerate().await
    }

    /// Inject the persisted snapshot into a fresh page. Must run before the
    /// page's first navigation. Best-effort: a missing or damaged artifact
    /// only logs, letting downstream validation catch the invalid session.
    pub async fn restore_session_storage(&self, page: &dyn BrowserPage) {
        match codec::load(&self.descriptor.snapshot_path) {
            Ok(snapshot) => {
                codec::restore_best_effort(
                    &snapshot,
                    page,
                    &self.descriptor.origin(),
                    &RestoreOptions::default(),
                )
                .await;
            }
            Err(e) => warn!("Could not restore session storage: {e}"),
        }
    }

    async fn regenerate(&mut self) -> SessionResult<()> {
        self.record(SessionState::Regenerating);
        info!("Creating new session for {}", self.descriptor.app);

        let credentials = match &self.credentials_override {
            Some(credentials) => credentials.clone(),
            None => credentials::resolve(&self.descriptor)?,
        };
        let mut handle = self.launcher.launch(self.config.headless).await?;
        let outcome = self.login_and_capture(handle.as_ref(), &credentials).await;
        if let Err(e) = handle.close().await {
            warn!("Failed to close login context: {e}");
        }

        let snapshot = outcome?;
        codec::persist(&snapshot, &self.descriptor.snapshot_path)?;
        self.record(SessionState::Ready);
        info!("Session ready for {}", self.descriptor.app);
        Ok(())
    }

    async fn login_and_capture(
        &self,
        handle: &dyn BrowserHandle,
        credentials: &CredentialSet,
    ) -> SessionResult<StorageSnapshot> {
        let page = handle.new_page().await?;
        let driver = LoginFlowDriver::new(&self.descriptor, &self.config);
        driver.run(page.as_ref(), credentials).await?;
        codec::capture(page.as_ref()).await
    }
}
