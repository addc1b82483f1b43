//! Credstore - CRUD access to the Windows Credential Manager.
//!
//! Credstore reads, writes, enumerates and deletes entries of the Windows
//! Credential Manager (the per-user, per-logon-session secret vault) through
//! a safe, owned [`Credential`] record. Every buffer the OS hands out is
//! owned by exactly one guard and freed exactly once, including on error
//! paths and when an enumeration is abandoned early.
//!
//! # Features
//!
//! - **Typed API**: Credential types, persistence scopes and flags are enums
//!   and bitflags, validated at construction
//! - **Absent is not an error**: A missing target is `Ok(None)`; deleting it
//!   succeeds
//! - **Lazy enumeration**: [`Credentials`] decodes one record at a time and
//!   frees the OS buffer when exhausted or dropped
//! - **Secret hygiene**: Secrets are zeroized on drop and redacted from `Debug`
//! - **Testable**: An in-memory API emulates OS buffers, status codes and
//!   call counts
//!
//! # Quick Start
//!
//! ```
//! use credstore::{factory, ApiType, Config, Credential, CredentialType};
//!
//! fn main() -> credstore::Result<()> {
//!     let manager = factory::new_manager(Config::new(ApiType::Mock))?;
//!
//!     let credential = Credential::builder("svc@host")
//!         .with_username("u1")
//!         .with_secret("p1")
//!         .build()?;
//!     manager.add(&credential)?;
//!
//!     let found = manager.find("svc@host", CredentialType::Generic)?;
//!     assert_eq!(found.map(|c| c.username().to_string()).as_deref(), Some("u1"));
//!
//!     for credential in manager.credentials()? {
//!         println!("{}", credential);
//!     }
//!
//!     manager.delete_by_id("svc@host", CredentialType::Generic)?;
//!     Ok(())
//! }
//! ```
//!
//! # Supported APIs
//!
//! | API | Feature Flag | Notes |
//! |-----|-------------|-------|
//! | Mock | `mock` (default) | In-memory, OS-shaped buffers |
//! | Win32 | `wincred` (default) | Windows only; `advapi32` via the `windows` crate |
//!
//! # Logging
//!
//! Anomalies (null buffers on success, decode failures, release failures,
//! unrecognized status codes) are reported through [`tracing`] with an
//! `operation` field. Installing a subscriber is up to the application.

pub mod config;
pub mod credential;
pub mod error;
pub mod factory;
pub mod manager;
pub mod native;
pub mod store;
pub mod validation;

pub use config::{ApiType, Config};
pub use credential::{
    Credential, CredentialBuilder, CredentialFlags, CredentialPersistence, CredentialType,
};
pub use error::{CredStoreError, Result};
pub use manager::{CredentialManager, Credentials};
pub use store::CredentialStore;

use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the credstore library.
///
/// This registers all compiled credential APIs with the factory. It's called
/// automatically by [`factory::new_manager`], but can be called explicitly
/// if needed (it's idempotent).
pub fn init() {
    INIT.call_once(native::register_all);
}
