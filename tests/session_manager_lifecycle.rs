//! Integration tests for the session-acquisition state machine, driven
//! entirely through the mock browser driver.

mod common;

use std::fs;
use std::time::Duration;

use tempfile::TempDir;

use common::*;
use portal_session::browser::mock::MockLauncher;
use portal_session::{SessionError, SessionManager, SessionState, StorageSnapshot};

fn manager_with(
    dir: &TempDir,
    launcher: &MockLauncher,
    config: portal_session::SessionConfig,
) -> SessionManager {
    init_logging();
    let path = dir.path().join("session.json");
    SessionManager::new(descriptor(path), config, Box::new(launcher.clone()))
        .with_credentials(credentials())
}

#[tokio::test]
async fn no_artifact_regenerates_end_to_end() {
    let dir = TempDir::new().unwrap();
    let launcher = MockLauncher::new();
    launcher.push_behavior(successful_login_behavior());
    let mut manager = manager_with(&dir, &launcher, fast_config());

    manager.ensure_session().await.unwrap();

    assert_eq!(
        manager.last_transitions(),
        &[
            SessionState::NoSnapshot,
            SessionState::Regenerating,
            SessionState::Ready
        ]
    );
    assert_eq!(launcher.launch_count(), 1);
    assert!(launcher.all_handles_closed());

    // Artifact written at the configured path, with the captured origin's
    // session storage inside.
    let raw = fs::read_to_string(dir.path().join("session.json")).unwrap();
    let snapshot: StorageSnapshot = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot.origins.len(), 1);
    assert!(!snapshot.origins[0].session_storage.is_empty());
}

#[tokio::test]
async fn fresh_artifact_short_circuits_with_zero_browser_launches() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    fs::create_dir_all(dir.path()).unwrap();
    fs::write(&path, serde_json::to_string(&StorageSnapshot::default()).unwrap()).unwrap();

    let launcher = MockLauncher::new();
    // Default freshness window is two hours; the artifact was written now.
    let mut manager = manager_with(&dir, &launcher, fast_config());

    manager.ensure_session().await.unwrap();

    assert_eq!(
        manager.last_transitions(),
        &[SessionState::FreshByAge, SessionState::Ready]
    );
    assert_eq!(launcher.launch_count(), 0, "no browser may be launched");
}

#[tokio::test]
async fn second_call_after_ready_is_a_cheap_no_op() {
    let dir = TempDir::new().unwrap();
    let launcher = MockLauncher::new();
    launcher.push_behavior(successful_login_behavior());
    let mut manager = manager_with(&dir, &launcher, fast_config());

    manager.ensure_session().await.unwrap();
    assert_eq!(launcher.launch_count(), 1);

    // The regeneration just wrote the artifact, so the second call rides
    // the freshness window and performs no login.
    manager.ensure_session().await.unwrap();
    assert_eq!(
        manager.last_transitions(),
        &[SessionState::FreshByAge, SessionState::Ready]
    );
    assert_eq!(launcher.launch_count(), 1);
}

#[tokio::test]
async fn stale_but_valid_session_skips_login() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    fs::write(&path, serde_json::to_string(&StorageSnapshot::default()).unwrap()).unwrap();

    let launcher = MockLauncher::new();
    launcher.push_behavior(valid_session_behavior());
    let config = fast_config().with_freshness_window(Duration::ZERO);
    let mut manager = manager_with(&dir, &launcher, config);

    manager.ensure_session().await.unwrap();

    assert_eq!(
        manager.last_transitions(),
        &[
            SessionState::PendingValidation,
            SessionState::Valid,
            SessionState::Ready
        ]
    );
    assert_eq!(launcher.launch_count(), 1, "only the validation context");
    assert!(launcher.all_handles_closed());
}

#[tokio::test]
async fn stale_invalid_session_regenerates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    fs::write(&path, serde_json::to_string(&StorageSnapshot::default()).unwrap()).unwrap();

    let launcher = MockLauncher::new();
    launcher.push_behavior(dead_session_behavior());
    launcher.push_behavior(successful_login_behavior());
    let config = fast_config().with_freshness_window(Duration::ZERO);
    let mut manager = manager_with(&dir, &launcher, config);

    manager.ensure_session().await.unwrap();

    assert_eq!(
        manager.last_transitions(),
        &[
            SessionState::PendingValidation,
            SessionState::Invalid,
            SessionState::Regenerating,
            SessionState::Ready
        ]
    );
    assert_eq!(launcher.launch_count(), 2);
    assert!(launcher.all_handles_closed());
}

#[tokio::test]
async fn corrupt_artifact_recovers_without_surfacing_the_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    fs::write(&path, "{ this is not json").unwrap();

    let launcher = MockLauncher::new();
    launcher.push_behavior(successful_login_behavior());
    let config = fast_config().with_freshness_window(Duration::ZERO);
    let mut manager = manager_with(&dir, &launcher, config);

    manager.ensure_session().await.unwrap();

    assert_eq!(
        manager.last_transitions(),
        &[
            SessionState::PendingValidation,
            SessionState::Invalid,
            SessionState::Regenerating,
            SessionState::Ready
        ]
    );

    // The damaged cache was replaced by a valid document.
    let raw = fs::read_to_string(&path).unwrap();
    assert!(serde_json::from_str::<StorageSnapshot>(&raw).is_ok());
}

#[tokio::test]
async fn regeneration_failure_is_fatal_and_leaves_no_artifact() {
    let dir = TempDir::new().unwrap();
    let launcher = MockLauncher::new();
    // IdP never shows the identity form.
    launcher.push_behavior(dead_session_behavior());
    let mut manager = manager_with(&dir, &launcher, fast_config());

    let err = manager.ensure_session().await.unwrap_err();
    assert!(matches!(err, SessionError::LoginFormNotFound { .. }));
    assert!(err.is_fatal());
    assert!(!dir.path().join("session.json").exists());
    assert!(launcher.all_handles_closed(), "login context must be closed");
}

#[tokio::test]
async fn create_new_session_forces_login_even_when_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    fs::write(&path, serde_json::to_string(&StorageSnapshot::default()).unwrap()).unwrap();

    let launcher = MockLauncher::new();
    launcher.push_behavior(successful_login_behavior());
    let mut manager = manager_with(&dir, &launcher, fast_config());

    manager.create_new_session().await.unwrap();

    assert_eq!(
        manager.last_transitions(),
        &[SessionState::Regenerating, SessionState::Ready]
    );
    assert_eq!(launcher.launch_count(), 1);
}
