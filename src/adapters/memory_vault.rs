//! In-memory secret vault adapter for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::ports::vault::{SecretVault, VaultError};

/// In-memory secret vault adapter for testing and development
///
/// Secrets are keyed by (scope, name); each entry is the ordered list of
/// immutable versions.
#[derive(Clone, Default)]
pub struct MemorySecretVault {
    secrets: Arc<RwLock<HashMap<(String, String), Vec<Vec<u8>>>>>,
}

impl MemorySecretVault {
    /// Create an empty vault
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of versions stored under (scope, name), for assertions
    pub fn version_count(&self, scope: &str, name: &str) -> usize {
        self.secrets
            .read()
            .unwrap()
            .get(&(scope.to_string(), name.to_string()))
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl SecretVault for MemorySecretVault {
    async fn create(&self, scope: &str, name: &str) -> Result<(), VaultError> {
        self.secrets
            .write()
            .unwrap()
            .entry((scope.to_string(), name.to_string()))
            .or_default();
        Ok(())
    }

    async fn add_version(&self, scope: &str, name: &str, data: &[u8]) -> Result<(), VaultError> {
        self.secrets
            .write()
            .unwrap()
            .entry((scope.to_string(), name.to_string()))
            .or_default()
            .push(data.to_vec());
        Ok(())
    }

    async fn latest_version(&self, scope: &str, name: &str) -> Result<Vec<u8>, VaultError> {
        self.secrets
            .read()
            .unwrap()
            .get(&(scope.to_string(), name.to_string()))
            .and_then(|versions| versions.last().cloned())
            .ok_or_else(|| VaultError::NotFound(format!("{scope}/{name}")))
    }

    async fn delete_scope(&self, scope: &str) -> Result<(), VaultError> {
        self.secrets
            .write()
            .unwrap()
            .retain(|(s, _), _| s != scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_version_appends() {
        let vault = MemorySecretVault::new();
        vault.create("scope", "password").await.unwrap();
        assert!(vault.latest_version("scope", "password").await.is_err());

        vault.add_version("scope", "password", b"first").await.unwrap();
        vault.add_version("scope", "password", b"second").await.unwrap();
        assert_eq!(
            vault.latest_version("scope", "password").await.unwrap(),
            b"second"
        );
        assert_eq!(vault.version_count("scope", "password"), 2);
    }

    #[tokio::test]
    async fn test_delete_scope_removes_all_names() {
        let vault = MemorySecretVault::new();
        vault.add_version("scope", "password", b"p").await.unwrap();
        vault.add_version("scope", "cert", b"c").await.unwrap();
        vault.delete_scope("scope").await.unwrap();
        assert!(vault.latest_version("scope", "password").await.is_err());
        assert!(vault.latest_version("scope", "cert").await.is_err());
    }
}
