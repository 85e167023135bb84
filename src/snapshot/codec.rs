//! Capture, persistence, and restoration of storage snapshots.
//!
//! Persistence is write-temp-then-rename in the artifact's own directory so
//! a partial write can never corrupt the previous valid snapshot. Restore is
//! registered as a pre-navigation init script: the application inspects
//! session storage synchronously on load to decide whether to redirect to
//! the identity provider, so restoring after navigation would be a no-op.

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::browser::BrowserPage;
use crate::error::{SessionError, SessionResult};
use crate::snapshot::{OriginState, StorageSnapshot};

/// Dumps the current origin's local and session storage as
/// `{ origin, localStorage: [{name, value}], sessionStorage: [...] }`.
const CAPTURE_STORAGE_JS: &str = r#"(() => {
  const dump = (store) => {
    const items = [];
    for (let i = 0; i < store.length; i++) {
      const name = store.key(i);
      if (name !== null) {
        const value = store.getItem(name);
        if (value !== null) items.push({ name, value });
      }
    }
    return items;
  };
  return {
    origin: window.location.origin,
    localStorage: dump(localStorage),
    sessionStorage: dump(sessionStorage)
  };
})()"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CapturedStorage {
    origin: String,
    #[serde(default)]
    local_storage: Vec<crate::snapshot::StorageItem>,
    #[serde(default)]
    session_storage: Vec<crate::snapshot::StorageItem>,
}

/// Controls restore logging; the once-per-worker chatter of the original
/// suite becomes an explicit quiet flag here.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    pub quiet: bool,
}

impl RestoreOptions {
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

/// Read cookies and the current origin's storage from a live page. Pure
/// read; the browser is not mutated.
pub async fn capture(page: &dyn BrowserPage) -> SessionResult<StorageSnapshot> {
    let cookies = page.cookies().await?;
    let value = page.evaluate(CAPTURE_STORAGE_JS).await?;
    let captured: CapturedStorage = serde_json::from_value(value)?;

    let mut snapshot = StorageSnapshot {
        cookies,
        origins: Vec::new(),
    };
    info!(
        "Captured {} sessionStorage and {} localStorage items for {}",
        captured.session_storage.len(),
        captured.local_storage.len(),
        captured.origin
    );
    snapshot.upsert_origin(OriginState {
        origin: captured.origin,
        local_storage: captured.local_storage,
        session_storage: captured.session_storage,
    });
    Ok(snapshot)
}

/// Write the snapshot to `path`, creating parent directories as needed.
/// Full overwrite of any existing artifact.
pub fn persist(snapshot: &StorageSnapshot, path: &Path) -> SessionResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let document = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &document)?;
    fs::rename(&tmp, path)?;
    info!("Session snapshot saved to {}", path.display());
    Ok(())
}

/// Read and parse the artifact at `path`.
pub fn load(path: &Path) -> SessionResult<StorageSnapshot> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SessionError::SnapshotNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&raw).map_err(|e| SessionError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Age of the artifact per its last-modified timestamp - the session
/// freshness marker. `None` when the artifact is absent or unreadable.
pub fn artifact_age(path: &Path) -> Option<Duration> {
    fs::metadata(path)
        .ok()?
        .modified()
        .ok()?
        .elapsed()
        .ok()
}

/// Inject cookies and storage into a not-yet-navigated page.
///
/// Storage is seeded through a pre-navigation init script; cookies go
/// through the driver. The caller decides which origin record applies
/// (normally the descriptor's base-URL origin); when no record matches,
/// the first one is used as a fallback.
pub async fn restore(
    snapshot: &StorageSnapshot,
    page: &dyn BrowserPage,
    target_origin: &str,
    options: &RestoreOptions,
) -> SessionResult<()> {
    if !snapshot.cookies.is_empty() {
        page.set_cookies(&snapshot.cookies).await?;
        if !options.quiet {
            debug!("Injected {} cookies", snapshot.cookies.len());
        }
    }

    let record = snapshot
        .origin(target_origin)
        .or_else(|| snapshot.origins.first());
    let Some(record) = record else {
        if !options.quiet {
            info!("Snapshot has no origin records - nothing to restore");
        }
        return Ok(());
    };

    let session_json = serde_json::to_string(&record.session_storage)?;
    let local_json = serde_json::to_string(&record.local_storage)?;
    let script = format!(
        r#"(() => {{
  const seed = (store, items) => {{
    try {{
      store.clear();
      for (const item of items) {{
        try {{ store.setItem(item.name, item.value); }} catch (e) {{}}
      }}
    }} catch (e) {{}}
  }};
  seed(sessionStorage, {session_json});
  seed(localStorage, {local_json});
}})()"#
    );
    page.add_init_script(&script).await?;

    if !options.quiet {
        let auth_keys = record
            .session_storage
            .iter()
            .filter(|item| {
                let lc = item.name.to_lowercase();
                lc.contains("msal") || lc.contains("token") || lc.contains("account")
            })
            .count();
        info!(
            "Restored {} sessionStorage and {} localStorage items for {} ({} auth-related keys)",
            record.session_storage.len(),
            record.local_storage.len(),
            record.origin,
            auth_keys
        );
    }
    Ok(())
}

/// Restoration is a best-effort optimization, never a dependency the flow
/// cannot survive losing: failures are logged and the page continues
/// unauthenticated, letting downstream validation trigger a fresh login.
pub async fn restore_best_effort(
    snapshot: &StorageSnapshot,
    page: &dyn BrowserPage,
    target_origin: &str,
    options: &RestoreOptions,
) {
    if let Err(e) = restore(snapshot, page, target_origin, options).await {
        warn!("Storage restoration failed, continuing unauthenticated: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Cookie, StorageItem};
    use tempfile::TempDir;

    fn sample_snapshot() -> StorageSnapshot {
        StorageSnapshot {
            cookies: vec![Cookie {
                name: "auth".to_string(),
                value: "tok".to_string(),
                domain: ".example.com".to_string(),
                path: "/".to_string(),
                expires: -1.0,
                http_only: true,
                secure: true,
                same_site: Some("Lax".to_string()),
            }],
            origins: vec![OriginState {
                origin: "https://app.example.com".to_string(),
                local_storage: vec![StorageItem {
                    name: "client_selection".to_string(),
                    value: "42".to_string(),
                }],
                session_storage: vec![StorageItem {
                    name: "msal.idtoken".to_string(),
                    value: "xyz".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let snapshot = sample_snapshot();

        persist(&snapshot, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn persist_overwrites_wholesale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        persist(&sample_snapshot(), &path).unwrap();
        let replacement = StorageSnapshot::default();
        persist(&replacement, &path).unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_missing_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SessionError::SnapshotNotFound { .. }));
    }

    #[test]
    fn load_malformed_artifact_is_corrupt_not_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{ not valid json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, SessionError::CorruptSnapshot { .. }));
        assert!(err.is_snapshot_miss());
    }

    #[test]
    fn no_temp_file_left_behind_after_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        persist(&sample_snapshot(), &path).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["session.json".to_string()]);
    }

    #[test]
    fn artifact_age_reports_recent_for_new_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        assert!(artifact_age(&path).is_none());

        persist(&sample_snapshot(), &path).unwrap();
        let age = artifact_age(&path).unwrap();
        assert!(age < Duration::from_secs(60));
    }
}
