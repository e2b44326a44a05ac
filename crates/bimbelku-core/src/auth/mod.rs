//! Authentication module for managing user sessions.
//!
//! This module provides:
//! - `Session`: the access/refresh token pair plus the user profile
//! - `CredentialStore`: the process-wide session holder with all-or-nothing updates
//! - `SessionPersistence`: storage port, backed by a file, the OS keychain or memory
//! - `RenewalCoordinator`: single-flight refresh-token exchange
//! - `AuthService`: login, registration and logout

pub mod keychain;
pub mod persistence;
pub mod renewal;
pub mod service;
pub mod session;
pub mod store;

pub use keychain::KeyringPersistence;
pub use persistence::{FilePersistence, MemoryPersistence, SessionPersistence};
pub use renewal::RenewalCoordinator;
pub use service::AuthService;
pub use session::Session;
pub use store::{ClearReason, CredentialStore, SessionEvent, SessionId};
