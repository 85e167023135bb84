//! Unified error type for session lifecycle management.
//!
//! This error type centralizes all failures that can occur while acquiring,
//! validating, or regenerating a browser session, providing a consistent
//! interface for error handling and propagation.
//!
//! Two families of errors exist with very different propagation policies:
//! - Fatal errors (missing credentials, login form never appeared, redirect
//!   never completed) surface all the way to the invoking test framework.
//! - Snapshot-layer errors (artifact absent or corrupt) are absorbed by the
//!   session manager and downgraded to "regenerate".

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type SessionResult<T> = Result<T, SessionError>;

/// Unified error type for session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    // ========== Configuration Errors ==========
    /// A deployment/config defect: missing OTP secret, malformed descriptor,
    /// absent base URL. Never retried; a human must fix configuration.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// None of the ordered environment-variable keys resolved to a value.
    #[error("Missing credential for {field}: set one of {}", keys.join(", "))]
    MissingCredential {
        field: &'static str,
        keys: Vec<String>,
    },

    // ========== Login Flow Errors ==========
    /// The identity provider's username field never appeared.
    #[error("Login form not found within {timeout:?}")]
    LoginFormNotFound { timeout: Duration },

    /// The redirect back to the application domain never completed.
    #[error("Authentication timeout after {timeout:?} - still on: {url}")]
    AuthenticationTimeout { url: String, timeout: Duration },

    // ========== Snapshot Errors ==========
    /// The snapshot artifact is simply absent. Triggers regeneration.
    #[error("Session snapshot not found at {}", path.display())]
    SnapshotNotFound { path: PathBuf },

    /// The snapshot artifact exists but cannot be parsed. Policy-equivalent
    /// to [`SessionError::SnapshotNotFound`]: a damaged cache is not a
    /// reason to fail a test run.
    #[error("Corrupt session snapshot at {}: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    // ========== Infrastructure Errors ==========
    /// Driver-level browser failure (launch, CDP command, page gone).
    #[error("Browser error: {message}")]
    Browser { message: String },

    /// Errors related to IO operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        SessionError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a browser-driver error.
    pub fn browser(message: impl Into<String>) -> Self {
        SessionError::Browser {
            message: message.into(),
        }
    }

    /// True for errors that must abort the current run rather than being
    /// absorbed into the reuse -> validate -> regenerate fallback chain.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Configuration { .. }
                | SessionError::MissingCredential { .. }
                | SessionError::LoginFormNotFound { .. }
                | SessionError::AuthenticationTimeout { .. }
        )
    }

    /// True when the error means "no usable snapshot" - the manager treats
    /// both variants identically and transitions to regeneration.
    pub fn is_snapshot_miss(&self) -> bool {
        matches!(
            self,
            SessionError::SnapshotNotFound { .. } | SessionError::CorruptSnapshot { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_exhausted_keys() {
        let err = SessionError::MissingCredential {
            field: "username",
            keys: vec!["CP_USERNAME".to_string(), "PORTAL_USER".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("CP_USERNAME"));
        assert!(msg.contains("PORTAL_USER"));
        assert!(err.is_fatal());
    }

    #[test]
    fn snapshot_errors_are_absorbable() {
        let not_found = SessionError::SnapshotNotFound {
            path: PathBuf::from("/tmp/session.json"),
        };
        let corrupt = SessionError::CorruptSnapshot {
            path: PathBuf::from("/tmp/session.json"),
            reason: "expected value at line 1".to_string(),
        };
        assert!(not_found.is_snapshot_miss());
        assert!(corrupt.is_snapshot_miss());
        assert!(!not_found.is_fatal());
        assert!(!corrupt.is_fatal());
    }

    #[test]
    fn login_flow_errors_are_fatal() {
        let form = SessionError::LoginFormNotFound {
            timeout: Duration::from_secs(30),
        };
        let redirect = SessionError::AuthenticationTimeout {
            url: "https://idp.b2clogin.com/authorize".to_string(),
            timeout: Duration::from_secs(60),
        };
        assert!(form.is_fatal());
        assert!(redirect.is_fatal());
        assert!(!form.is_snapshot_miss());
    }
}
