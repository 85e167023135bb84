//! Session lifecycle management for browser-driven E2E testing of the
//! Client Portal and Back Office applications.
//!
//! The target applications authenticate through an external federated
//! identity provider (OIDC-style redirect login with a TOTP challenge).
//! Paying that login cost on every test run is prohibitive, so this crate
//! persists browser storage state (cookies, local storage, session storage)
//! to a durable snapshot artifact and decides on each run whether to reuse
//! it, validate it against the live application, or regenerate it with a
//! fresh scripted login.
//!
//! The two operations the page-object/business-flow layer consumes:
//!
//! ```ignore
//! use portal_session::browser::chromium::ChromiumLauncher;
//! use portal_session::{SessionManager, TargetApp};
//!
//! # async fn run() -> portal_session::SessionResult<()> {
//! portal_session::config::load_env();
//! let mut manager = SessionManager::for_app(
//!     TargetApp::detect_from_env(),
//!     Box::new(ChromiumLauncher::new()),
//! )?;
//!
//! // Once before driving any page:
//! manager.ensure_session().await?;
//!
//! // Once per fresh page, before its first navigation:
//! // manager.restore_session_storage(&page).await;
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod credentials;
pub mod error;
pub mod login;
pub mod manager;
pub mod readiness;
pub mod snapshot;
pub mod totp;
pub mod validator;

pub use config::{AppDescriptor, SessionConfig, TargetApp};
pub use credentials::CredentialSet;
pub use error::{SessionError, SessionResult};
pub use manager::{SessionManager, SessionState};
pub use snapshot::StorageSnapshot;
pub use validator::ValidationVerdict;
