//! Shared fixtures for session lifecycle integration tests.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;

use portal_session::browser::mock::MockBehavior;
use portal_session::config::{AppDescriptor, SessionConfig, TargetApp};
use portal_session::credentials::CredentialSet;

pub const IDP_URL: &str = "https://tenant.b2clogin.com/authorize?client=cp";
pub const DASHBOARD_URL: &str = "https://app.example.com/dashboard";
pub const APP_ORIGIN: &str = "https://app.example.com";
pub const OTP_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

pub fn descriptor(snapshot_path: PathBuf) -> AppDescriptor {
    AppDescriptor {
        app: TargetApp::ClientPortal,
        base_url: APP_ORIGIN.to_string(),
        snapshot_path,
        username_keys: vec!["CP_USERNAME".to_string()],
        password_keys: vec!["CP_PASSWORD".to_string()],
        otp_secret_keys: vec!["CP_OTPSECRET".to_string()],
        login_url_patterns: vec![
            "b2clogin.com".to_string(),
            "/login".to_string(),
            "/signin".to_string(),
        ],
    }
}

pub fn credentials() -> CredentialSet {
    CredentialSet {
        username: "alice@example.com".to_string(),
        password: "hunter2".to_string(),
        otp_secret: OTP_SECRET.to_string(),
    }
}

/// Route crate logs through the test harness; `RUST_LOG=debug cargo test`
/// shows the state-machine narration on failures.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// All waits shrunk so absent-selector and polling paths finish in
/// milliseconds against the mock driver.
pub fn fast_config() -> SessionConfig {
    SessionConfig::default()
        .with_login_form_timeout(Duration::from_millis(50))
        .with_mfa_probe_timeout(Duration::from_millis(50))
        .with_redirect_timeout(Duration::from_millis(200))
        .with_readiness_timeout(Duration::from_millis(20))
        .with_auth_detect_timeout(Duration::from_millis(20))
        .with_nav_probe_timeout(Duration::from_millis(20))
        .with_poll_interval(Duration::from_millis(10))
        .with_validation_settle(Duration::from_millis(1))
}

/// A context that plays out the full federated login: redirect to the
/// identity provider, credential + MFA forms, redirect home on continue,
/// and storage ready for capture afterwards.
pub fn successful_login_behavior() -> MockBehavior {
    MockBehavior::default()
        .with_redirect_on_navigate(IDP_URL)
        .with_visible("#signInName")
        .with_visible("#otpCode")
        .with_url_after_click("#continue", DASHBOARD_URL)
        // Post-login bootstrap heuristic: sessionStorage is populated.
        .with_eval_response("length > 5", json!(true))
        // Storage capture for the authenticated origin.
        .with_eval_response(
            "dump(localStorage)",
            json!({
                "origin": APP_ORIGIN,
                "localStorage": [
                    { "name": "client_selection", "value": "42" },
                    { "name": "entity_selection", "value": "7" }
                ],
                "sessionStorage": [
                    { "name": "msal.token.keys", "value": "abc" },
                    { "name": "msal.account.keys", "value": "def" }
                ]
            }),
        )
}

/// A context whose navigation lands straight on an authenticated shell
/// with visible navigation - what the validator sees for a live session.
pub fn valid_session_behavior() -> MockBehavior {
    MockBehavior::default()
        .with_visible(".sidebar, nav, [role=\"navigation\"]")
        .with_eval_response(
            "hasLocalStorageData",
            json!({ "hasLocalStorageData": true, "sessionStorageKeys": 9 }),
        )
}

/// A context that bounces every navigation to the identity provider -
/// what the validator sees for a dead session.
pub fn dead_session_behavior() -> MockBehavior {
    MockBehavior::default().with_redirect_on_navigate(IDP_URL)
}
