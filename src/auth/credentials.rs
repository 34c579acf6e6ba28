//! Bearer token storage.

use std::sync::{PoisonError, RwLock};

use secrecy::SecretString;

/// Source of the bearer token attached to outgoing requests.
///
/// Implement this trait to back tokens by a keychain, a session file or any
/// other store. The pipeline reads the token before every attempt and clears
/// it once when the backend answers 401.
pub trait CredentialStore: Send + Sync {
    /// The current access token, if any.
    fn auth_token(&self) -> Option<SecretString>;

    /// Replace the token, e.g. after a login or refresh call.
    fn set_auth_token(&self, token: SecretString);

    /// Forget the current access token.
    fn clear_auth_token(&self);
}

/// In-memory token store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: RwLock<Option<SecretString>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(SecretString::from(token.into()))),
        }
    }

    /// Check if a token is stored.
    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn auth_token(&self) -> Option<SecretString> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_auth_token(&self, token: SecretString) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(token);
    }

    fn clear_auth_token(&self) {
        let mut guard = self.token.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("token", &self.has_token().then_some("[REDACTED]"))
            .finish()
    }
}

/// Token seeded from an environment variable.
///
/// By default, reads `PENGUIN_API_TOKEN`. Setting or clearing only affects
/// this value, not the process environment.
pub struct EnvCredentials {
    inner: MemoryCredentialStore,
}

impl EnvCredentials {
    /// Read the token from `PENGUIN_API_TOKEN`.
    pub fn from_env() -> Self {
        Self::from_env_var("PENGUIN_API_TOKEN")
    }

    /// Read the token from a custom variable. An unset variable yields an
    /// empty store.
    pub fn from_env_var(var: &str) -> Self {
        let inner = match std::env::var(var) {
            Ok(token) if !token.is_empty() => MemoryCredentialStore::with_token(token),
            _ => MemoryCredentialStore::new(),
        };
        Self { inner }
    }
}

impl CredentialStore for EnvCredentials {
    fn auth_token(&self) -> Option<SecretString> {
        self.inner.auth_token()
    }

    fn set_auth_token(&self, token: SecretString) {
        self.inner.set_auth_token(token);
    }

    fn clear_auth_token(&self) {
        self.inner.clear_auth_token();
    }
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("inner", &self.inner)
            .finish()
    }
}
