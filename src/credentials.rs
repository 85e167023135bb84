//! Environment-scoped credential resolution.
//!
//! Each credential field is resolved by trying an ordered list of environment
//! keys and taking the first non-empty value. Missing credentials are always
//! fatal and always immediate: a human must fix configuration, so there is
//! nothing to retry.

use crate::config::{AppDescriptor, EnvLookup};
use crate::error::{SessionError, SessionResult};

/// Resolved credentials for one target application. Immutable once resolved
/// for a run; never persisted.
#[derive(Clone)]
pub struct CredentialSet {
    pub username: String,
    pub password: String,
    pub otp_secret: String,
}

impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSet")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("otp_secret", &"[REDACTED]")
            .finish()
    }
}

/// Resolve credentials from the process environment.
pub fn resolve(descriptor: &AppDescriptor) -> SessionResult<CredentialSet> {
    resolve_with(descriptor, &|key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    })
}

/// Resolve credentials with an explicit environment lookup.
pub fn resolve_with(
    descriptor: &AppDescriptor,
    lookup: EnvLookup<'_>,
) -> SessionResult<CredentialSet> {
    Ok(CredentialSet {
        username: first_non_empty("username", &descriptor.username_keys, lookup)?,
        password: first_non_empty("password", &descriptor.password_keys, lookup)?,
        otp_secret: first_non_empty("otp_secret", &descriptor.otp_secret_keys, lookup)?,
    })
}

fn first_non_empty(
    field: &'static str,
    keys: &[String],
    lookup: EnvLookup<'_>,
) -> SessionResult<String> {
    keys.iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
        .ok_or_else(|| SessionError::MissingCredential {
            field,
            keys: keys.to_vec(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetApp;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn descriptor() -> AppDescriptor {
        AppDescriptor {
            app: TargetApp::ClientPortal,
            base_url: "https://app.example.com".to_string(),
            snapshot_path: PathBuf::from("/tmp/session.json"),
            username_keys: vec!["CP_USERNAME".to_string(), "PORTAL_USER".to_string()],
            password_keys: vec!["CP_PASSWORD".to_string()],
            otp_secret_keys: vec!["CP_OTPSECRET".to_string()],
            login_url_patterns: vec!["/login".to_string()],
        }
    }

    #[test]
    fn takes_first_non_empty_value_in_order() {
        let vars: HashMap<String, String> = [
            ("CP_USERNAME", ""),
            ("PORTAL_USER", "alice@example.com"),
            ("CP_PASSWORD", "hunter2"),
            ("CP_OTPSECRET", "JBSWY3DPEHPK3PXP"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let lookup = |k: &str| vars.get(k).cloned().filter(|v| !v.is_empty());
        let creds = resolve_with(&descriptor(), &lookup).unwrap();
        assert_eq!(creds.username, "alice@example.com");
        assert_eq!(creds.password, "hunter2");
    }

    #[test]
    fn missing_field_names_every_exhausted_key() {
        let vars: HashMap<String, String> = [
            ("CP_PASSWORD", "hunter2"),
            ("CP_OTPSECRET", "JBSWY3DPEHPK3PXP"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let lookup = |k: &str| vars.get(k).cloned();
        let err = resolve_with(&descriptor(), &lookup).unwrap_err();
        match &err {
            SessionError::MissingCredential { field, keys } => {
                assert_eq!(*field, "username");
                assert_eq!(keys.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let creds = CredentialSet {
            username: "alice@example.com".to_string(),
            password: "hunter2".to_string(),
            otp_secret: "JBSWY3DPEHPK3PXP".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("alice@example.com"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("JBSWY3DPEHPK3PXP"));
        assert!(debug.contains("[REDACTED]"));
    }
}
