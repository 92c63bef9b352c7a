//! File-backed secret vault
//!
//! Layout: `<base>/<scope>/<name>/<version>.bin` with versions numbered
//! from one. Versions are immutable once written; `latest_version` picks
//! the highest number present.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::ports::vault::{SecretVault, VaultError};

/// File-backed secret vault
pub struct FileSecretVault {
    /// Base directory for secret storage
    base_dir: PathBuf,
}

impl FileSecretVault {
    /// Create a new file-backed vault rooted at `base_dir`
    pub async fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, VaultError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| VaultError::Io(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&base_dir)
                .await
                .map_err(|e| VaultError::Io(e.to_string()))?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o700);
            fs::set_permissions(&base_dir, perms)
                .await
                .map_err(|e| VaultError::Io(e.to_string()))?;
        }

        Ok(Self { base_dir })
    }

    fn bucket_path(&self, scope: &str, name: &str) -> PathBuf {
        self.base_dir.join(scope).join(name)
    }

    /// Highest version number currently stored in the bucket
    async fn latest_number(&self, bucket: &Path) -> Result<u32, VaultError> {
        if !bucket.exists() {
            return Ok(0);
        }
        let mut entries = fs::read_dir(bucket)
            .await
            .map_err(|e| VaultError::Io(e.to_string()))?;
        let mut latest = 0u32;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VaultError::Io(e.to_string()))?
        {
            let file_name = entry.file_name();
            let version = file_name
                .to_string_lossy()
                .strip_suffix(".bin")
                .and_then(|stem| stem.parse::<u32>().ok());
            if let Some(version) = version {
                latest = latest.max(version);
            }
        }
        Ok(latest)
    }
}

#[async_trait]
impl SecretVault for FileSecretVault {
    async fn create(&self, scope: &str, name: &str) -> Result<(), VaultError> {
        fs::create_dir_all(self.bucket_path(scope, name))
            .await
            .map_err(|e| VaultError::Io(e.to_string()))
    }

    async fn add_version(&self, scope: &str, name: &str, data: &[u8]) -> Result<(), VaultError> {
        let bucket = self.bucket_path(scope, name);
        fs::create_dir_all(&bucket)
            .await
            .map_err(|e| VaultError::Io(e.to_string()))?;

        let next = self.latest_number(&bucket).await? + 1;
        fs::write(bucket.join(format!("{next:08}.bin")), data)
            .await
            .map_err(|e| VaultError::Io(e.to_string()))
    }

    async fn latest_version(&self, scope: &str, name: &str) -> Result<Vec<u8>, VaultError> {
        let bucket = self.bucket_path(scope, name);
        let latest = self.latest_number(&bucket).await?;
        if latest == 0 {
            return Err(VaultError::NotFound(format!("{scope}/{name}")));
        }
        fs::read(bucket.join(format!("{latest:08}.bin")))
            .await
            .map_err(|e| VaultError::Io(e.to_string()))
    }

    async fn delete_scope(&self, scope: &str) -> Result<(), VaultError> {
        let path = self.base_dir.join(scope);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(path)
            .await
            .map_err(|e| VaultError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versions_append_and_latest_wins() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileSecretVault::new(dir.path()).await.unwrap();

        vault.create("scope", "password").await.unwrap();
        assert!(matches!(
            vault.latest_version("scope", "password").await.unwrap_err(),
            VaultError::NotFound(_)
        ));

        vault.add_version("scope", "password", b"first").await.unwrap();
        vault.add_version("scope", "password", b"second").await.unwrap();
        assert_eq!(
            vault.latest_version("scope", "password").await.unwrap(),
            b"second"
        );
    }

    #[tokio::test]
    async fn test_delete_scope_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileSecretVault::new(dir.path()).await.unwrap();

        vault.add_version("scope", "cert", b"bundle").await.unwrap();
        vault.delete_scope("scope").await.unwrap();
        vault.delete_scope("scope").await.unwrap();
        assert!(vault.latest_version("scope", "cert").await.is_err());
    }
}
