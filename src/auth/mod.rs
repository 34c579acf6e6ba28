//! Authentication collaborators.
//!
//! This module provides:
//! - Bearer token storage with secret-safe handling
//! - The navigation hook invoked when the backend rejects the session (401)

mod credentials;
mod navigator;

pub use credentials::{CredentialStore, EnvCredentials, MemoryCredentialStore};
pub use navigator::{Navigator, NoopNavigator};
