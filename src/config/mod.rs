//! Configuration for session lifecycle management.
//!
//! This module provides the closed set of target applications, the static
//! per-application descriptor (base URL, snapshot artifact path, credential
//! environment keys), and the tunable timeouts the rest of the crate
//! consumes. Descriptors are resolved once per session manager instance and
//! are immutable thereafter.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{SessionError, SessionResult};

/// Environment lookup used by descriptor resolution and app detection so
/// tests can substitute a deterministic map for the process environment.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Load `.env` into the process environment if present. Best-effort: an
/// absent file is the normal case on CI where variables come from the runner.
pub fn load_env() {
    let _ = dotenvy::dotenv();
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// The closed set of applications this suite can drive. Adding a third
/// application is a compile-time-checked extension of this enum and the
/// descriptor table below, not a string-matching addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetApp {
    ClientPortal,
    BackOffice,
}

impl TargetApp {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetApp::ClientPortal => "ClientPortal",
            TargetApp::BackOffice => "BackOffice",
        }
    }

    /// Pick the target application from the process environment.
    pub fn detect_from_env() -> Self {
        Self::detect_with(&process_env)
    }

    /// Detection heuristics, in priority order: the test-runner project name,
    /// a generic `APP`/`TEST_APP` override, then "only a Back Office base URL
    /// is configured". Defaults to the Client Portal.
    pub fn detect_with(lookup: EnvLookup<'_>) -> Self {
        let by_project = lookup("PW_PROJECT")
            .or_else(|| lookup("PLAYWRIGHT_PROJECT_NAME"))
            .unwrap_or_default()
            .to_lowercase();
        if by_project.contains("backoffice") || by_project.contains("bo") {
            return TargetApp::BackOffice;
        }

        let by_generic = lookup("APP")
            .or_else(|| lookup("TEST_APP"))
            .unwrap_or_default()
            .to_lowercase();
        match by_generic.as_str() {
            "backoffice" | "bo" => return TargetApp::BackOffice,
            "clientportal" | "cp" => return TargetApp::ClientPortal,
            _ => {}
        }

        let has_bo = lookup("BO_BASE_URL").is_some();
        let has_cp = lookup("CP_BASE_URL").is_some();
        if has_bo && !has_cp {
            return TargetApp::BackOffice;
        }

        TargetApp::ClientPortal
    }
}

impl std::fmt::Display for TargetApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration for one target application.
#[derive(Debug, Clone)]
pub struct AppDescriptor {
    pub app: TargetApp,
    /// Application root the login flow navigates to.
    pub base_url: String,
    /// Durable location of the storage snapshot artifact.
    pub snapshot_path: PathBuf,
    /// Ordered environment keys tried for each credential field.
    pub username_keys: Vec<String>,
    pub password_keys: Vec<String>,
    pub otp_secret_keys: Vec<String>,
    /// URL fragments that mean "still on the identity provider or a
    /// login/logout page".
    pub login_url_patterns: Vec<String>,
}

impl AppDescriptor {
    /// Resolve the descriptor for `app` from the process environment.
    pub fn resolve(app: TargetApp) -> SessionResult<Self> {
        Self::resolve_with(app, &process_env)
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with(app: TargetApp, lookup: EnvLookup<'_>) -> SessionResult<Self> {
        let (base_url_key, prefix, default_artifact) = match app {
            TargetApp::ClientPortal => ("CP_BASE_URL", "CP", "client_portal.json"),
            TargetApp::BackOffice => ("BO_BASE_URL", "BO", "back_office.json"),
        };

        let base_url = lookup(base_url_key).ok_or_else(|| {
            SessionError::configuration(format!("{} is not set for {}", base_url_key, app))
        })?;

        let snapshot_path = lookup(&format!("{}_SESSION_PATH", prefix))
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                PathBuf::from("fixtures")
                    .join("session")
                    .join(default_artifact)
            });

        Ok(AppDescriptor {
            app,
            base_url,
            snapshot_path,
            username_keys: vec![format!("{}_USERNAME", prefix)],
            password_keys: vec![format!("{}_PASSWORD", prefix)],
            otp_secret_keys: vec![format!("{}_OTPSECRET", prefix)],
            login_url_patterns: default_login_url_patterns(),
        })
    }

    /// True when `url` still points at the identity provider or an
    /// application login/logout route.
    pub fn is_login_url(&self, url: &str) -> bool {
        self.login_url_patterns.iter().any(|p| url.contains(p))
    }

    /// The scheme+host[:port] origin of the base URL, used to pick the
    /// matching record out of a storage snapshot.
    pub fn origin(&self) -> String {
        origin_of(&self.base_url)
    }
}

fn default_login_url_patterns() -> Vec<String> {
    ["b2clogin.com", "/login", "/signin", "/logout", "redirecting"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Extract `scheme://host[:port]` from a URL, dropping path and query.
pub fn origin_of(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            match rest.find('/') {
                Some(path_start) => url[..scheme_end + 3 + path_start].to_string(),
                None => url.to_string(),
            }
        }
        None => url.to_string(),
    }
}

/// Tunable timings for the session lifecycle. The source suite hard-coded
/// these; they are configurable here because none of the specific values are
/// load-bearing.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A snapshot artifact younger than this is trusted without validation.
    pub freshness_window: Duration,
    /// Settle delay after navigating with a restored snapshot, giving the
    /// SPA a moment to run its initial auth checks.
    pub validation_settle: Duration,
    /// How long the login driver waits for the identity form to appear.
    pub login_form_timeout: Duration,
    /// How long to probe for the MFA challenge field. Absence within this
    /// window is a normal transition, not an error.
    pub mfa_probe_timeout: Duration,
    /// How long to wait for the post-login redirect to leave the identity
    /// provider domain.
    pub redirect_timeout: Duration,
    /// Per-landmark timeout for the readiness prober.
    pub readiness_timeout: Duration,
    /// How long the login driver probes for an already-authenticated shell
    /// before falling through to the identity form.
    pub auth_detect_timeout: Duration,
    /// How long the validator probes for visible navigation structure.
    pub nav_probe_timeout: Duration,
    /// Poll interval for URL and storage polling loops.
    pub poll_interval: Duration,
    /// Whether regeneration logins run headless.
    pub headless: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(2 * 60 * 60),
            validation_settle: Duration::from_secs(1),
            login_form_timeout: Duration::from_secs(30),
            mfa_probe_timeout: Duration::from_secs(15),
            redirect_timeout: Duration::from_secs(60),
            readiness_timeout: Duration::from_secs(5),
            auth_detect_timeout: Duration::from_secs(3),
            nav_probe_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_millis(250),
            headless: true,
        }
    }
}

impl SessionConfig {
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    pub fn with_redirect_timeout(mut self, timeout: Duration) -> Self {
        self.redirect_timeout = timeout;
        self
    }

    pub fn with_login_form_timeout(mut self, timeout: Duration) -> Self {
        self.login_form_timeout = timeout;
        self
    }

    pub fn with_mfa_probe_timeout(mut self, timeout: Duration) -> Self {
        self.mfa_probe_timeout = timeout;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_auth_detect_timeout(mut self, timeout: Duration) -> Self {
        self.auth_detect_timeout = timeout;
        self
    }

    pub fn with_nav_probe_timeout(mut self, timeout: Duration) -> Self {
        self.nav_probe_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_validation_settle(mut self, settle: Duration) -> Self {
        self.validation_settle = settle;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}
