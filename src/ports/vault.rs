//! Secret vault port
//!
//! Versioned secret CRUD scoped per certificate request. Binding the
//! scope to the request identifier keeps the PKCS#12 password and the
//! downloaded bundle garbage-collectable as a unit.

use async_trait::async_trait;
use thiserror::Error;

/// Well-known secret name holding the PKCS#12 password
pub const SECRET_PASSWORD: &str = "password";

/// Well-known secret name holding the PKCS#12 bundle
pub const SECRET_CERT: &str = "cert";

/// Vault-specific errors
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("no version of secret {0}")]
    NotFound(String),

    #[error("vault io error: {0}")]
    Io(String),

    #[error("vault backend error: {0}")]
    Backend(String),
}

/// Port for per-request secret storage
///
/// All calls are idempotent on (scope, name) except `add_version`, which
/// always appends; versions are immutable once written.
#[async_trait]
pub trait SecretVault: Send + Sync {
    /// Ensure a secret bucket exists under the scope
    async fn create(&self, scope: &str, name: &str) -> Result<(), VaultError>;

    /// Append a new immutable version of the secret
    async fn add_version(&self, scope: &str, name: &str, data: &[u8]) -> Result<(), VaultError>;

    /// Fetch the most recent version; `NotFound` when none exists
    async fn latest_version(&self, scope: &str, name: &str) -> Result<Vec<u8>, VaultError>;

    /// Remove the scope and every secret under it
    async fn delete_scope(&self, scope: &str) -> Result<(), VaultError>;
}
