//! The federated-login flow driver.
//!
//! Drives the redirect login sequence end to end against a single browser
//! context: navigate, submit identity, solve the MFA challenge when the
//! provider presents one, wait for the redirect back to the application
//! domain, then hand off to the readiness prober.
//!
//! There is deliberately no retry inside this driver. It runs on the last
//! tier of the reuse -> validate -> regenerate chain; flakiness here means a
//! real infrastructure or credential problem, and repeated submissions
//! against a live MFA provider risk account lockout.

use std::time::Instant;

use log::{debug, info};

use crate::browser::BrowserPage;
use crate::config::{AppDescriptor, SessionConfig};
use crate::credentials::CredentialSet;
use crate::error::{SessionError, SessionResult};
use crate::readiness::{self, ReadinessOptions};
use crate::totp;

/// Identity-provider form selectors (Azure B2C shape).
pub const USERNAME_FIELD: &str = "#signInName";
pub const PASSWORD_FIELD: &str = "#password";
pub const SIGN_IN_BUTTON: &str = "button#next";
pub const OTP_FIELD: &str = "#otpCode";
pub const OTP_CONTINUE: &str = "#continue";

/// Landmark indicating an already-authenticated application shell.
const AUTH_LANDMARK: &str = ".sidebar, nav";

pub struct LoginFlowDriver<'a> {
    descriptor: &'a AppDescriptor,
    config: &'a SessionConfig,
}

impl<'a> LoginFlowDriver<'a> {
    pub fn new(descriptor: &'a AppDescriptor, config: &'a SessionConfig) -> Self {
        Self { descriptor, config }
    }

    /// Run the login sequence to completion. Safe to invoke when already
    /// logged in: an authenticated shell short-circuits immediately.
    pub async fn run(
        &self,
        page: &dyn BrowserPage,
        credentials: &CredentialSet,
    ) -> SessionResult<()> {
        info!("Starting login flow for {}", self.descriptor.app);
        page.navigate(&self.descriptor.base_url).await?;

        if self.already_authenticated(page).await? {
            info!("Already authenticated - skipping login");
            return Ok(());
        }

        if !page
            .wait_for_visible(USERNAME_FIELD, self.config.login_form_timeout)
            .await?
        {
            return Err(SessionError::LoginFormNotFound {
                timeout: self.config.login_form_timeout,
            });
        }

        info!("Identity form detected - submitting credentials");
        page.fill(USERNAME_FIELD, &credentials.username).await?;
        page.fill(PASSWORD_FIELD, &credentials.password).await?;
        page.click(SIGN_IN_BUTTON).await?;

        // MFA is optional per login, not guaranteed: absence within the
        // probe window is a normal transition, not an error.
        if page
            .wait_for_visible(OTP_FIELD, self.config.mfa_probe_timeout)
            .await?
        {
            // Generated fresh at submission time; a stale code is never
            // resubmitted, a new driver invocation regenerates instead.
            let code = totp::generate(&credentials.otp_secret)?;
            info!("MFA challenge detected - submitting TOTP code");
            page.fill(OTP_FIELD, &code).await?;
            page.click(OTP_CONTINUE).await?;
        } else {
            info!(
                "No MFA challenge within {:?}",
                self.config.mfa_probe_timeout
            );
        }

        self.await_redirect(page).await?;

        let readiness_options = ReadinessOptions {
            per_landmark_timeout: self.config.readiness_timeout,
            ..ReadinessOptions::default()
        };
        let readiness = readiness::await_ready(page, &readiness_options).await?;
        debug!("Post-login readiness: {readiness:?}");
        if readiness::storage_initialized(
            page,
            self.config.readiness_timeout,
            self.config.poll_interval,
        )
        .await
        {
            info!("Application state initialized");
        } else {
            info!("Storage validation timeout - app may still be loading");
        }

        info!("Login flow complete for {}", self.descriptor.app);
        Ok(())
    }

    /// Idempotent short-circuit: true when no redirect to the identity
    /// provider occurred and the authenticated shell is already visible.
    async fn already_authenticated(&self, page: &dyn BrowserPage) -> SessionResult<bool> {
        let url = page.current_url().await?;
        if self.descriptor.is_login_url(&url) {
            return Ok(false);
        }
        page.wait_for_visible(AUTH_LANDMARK, self.config.auth_detect_timeout)
            .await
    }

    /// Poll the URL until it no longer matches any identity-provider or
    /// login/logout pattern. Bounded iterative loop with a hard deadline.
    async fn await_redirect(&self, page: &dyn BrowserPage) -> SessionResult<()> {
        let deadline = Instant::now() + self.config.redirect_timeout;
        loop {
            let url = page.current_url().await?;
            if !self.descriptor.is_login_url(&url) {
                info!("Redirected back to application: {url}");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::AuthenticationTimeout {
                    url,
                    timeout: self.config.redirect_timeout,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}
