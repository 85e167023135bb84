//! Browser storage snapshots - the unit of durable session state.
//!
//! A snapshot captures everything the application needs to recognize an
//! authenticated browser on the next run: cookies plus per-origin local and
//! session storage. The on-disk document uses the Playwright storage-state
//! field names so artifacts written by either tool remain interchangeable.

pub mod codec;

use serde::{Deserialize, Serialize};

/// One browser cookie, serialized with the storage-state wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    /// Unix seconds; -1 for session cookies.
    #[serde(default = "session_cookie_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn session_cookie_expiry() -> f64 {
    -1.0
}

/// A single key/value storage entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    pub name: String,
    pub value: String,
}

/// Local and session storage captured for one origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageItem>,
    #[serde(default)]
    pub session_storage: Vec<StorageItem>,
}

/// The durable session artifact: cookies plus per-origin storage records.
///
/// Invariant: at most one record per distinct origin, enforced by
/// [`StorageSnapshot::upsert_origin`]. Overwritten wholesale on each
/// successful regeneration, never merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl StorageSnapshot {
    /// Look up the record for `origin`, if any.
    pub fn origin(&self, origin: &str) -> Option<&OriginState> {
        self.origins.iter().find(|o| o.origin == origin)
    }

    /// Insert or replace the record for `state.origin`, keeping the
    /// one-record-per-origin invariant.
    pub fn upsert_origin(&mut self, state: OriginState) {
        match self.origins.iter_mut().find(|o| o.origin == state.origin) {
            Some(existing) => *existing = state,
            None => self.origins.push(state),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.is_empty()
    }
}
