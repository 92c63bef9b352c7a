//! File-backed directory store
//!
//! One JSON document per entity under `vasps/`, `certreqs/`, and
//! `certs/`, plus an in-memory index persisted to `index.json`. The
//! index carries the unique common-name mapping and the request status
//! table so lookups and list scans do not touch every file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::models::{Certificate, CertificateRequest, RequestStatus, Vasp};
use crate::ports::store::{matches_query, DirectoryStore, SearchQuery, StoreError};

const VASP_DIR: &str = "vasps";
const CERTREQ_DIR: &str = "certreqs";
const CERT_DIR: &str = "certs";
const INDEX_FILE: &str = "index.json";

/// Secondary indices persisted alongside the entity files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreIndex {
    /// Unique common-name index
    common_names: HashMap<String, Uuid>,
    /// Request status table for list scans
    request_status: HashMap<Uuid, RequestStatus>,
}

/// File-backed directory store
pub struct FileDirectoryStore {
    /// Base directory for entity storage
    base_dir: PathBuf,
    /// In-memory index of stored entities
    index: Arc<RwLock<StoreIndex>>,
}

impl FileDirectoryStore {
    /// Create a new file-backed store rooted at `base_dir`
    pub async fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();

        for dir in [VASP_DIR, CERTREQ_DIR, CERT_DIR] {
            fs::create_dir_all(base_dir.join(dir))
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        // Restrict to the service user; records carry PII
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&base_dir)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
            let mut perms = metadata.permissions();
            perms.set_mode(0o700);
            fs::set_permissions(&base_dir, perms)
                .await
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let store = Self {
            base_dir,
            index: Arc::new(RwLock::new(StoreIndex::default())),
        };
        store.load_index().await?;
        Ok(store)
    }

    /// Load the index from disk
    async fn load_index(&self) -> Result<(), StoreError> {
        let index_path = self.base_dir.join(INDEX_FILE);
        if !index_path.exists() {
            return Ok(());
        }

        let data = fs::read(&index_path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let loaded: StoreIndex =
            serde_json::from_slice(&data).map_err(|e| StoreError::Corrupted(e.to_string()))?;

        let mut index = self.index.write().unwrap();
        *index = loaded;
        info!(
            "loaded directory index: {} vasps, {} certificate requests",
            index.common_names.len(),
            index.request_status.len()
        );
        Ok(())
    }

    /// Save the index to disk
    async fn save_index(&self) -> Result<(), StoreError> {
        let data = {
            let index = self.index.read().unwrap();
            serde_json::to_vec_pretty(&*index)
                .map_err(|e| StoreError::Serialization(e.to_string()))?
        };
        fs::write(self.base_dir.join(INDEX_FILE), data)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    fn entity_path(&self, dir: &str, id: &Uuid) -> PathBuf {
        self.base_dir.join(dir).join(format!("{id}.json"))
    }

    async fn write_entity<T: Serialize>(
        &self,
        dir: &str,
        id: &Uuid,
        entity: &T,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(entity)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(self.entity_path(dir, id), data)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn read_entity<T: for<'de> Deserialize<'de>>(
        &self,
        dir: &str,
        id: &Uuid,
        kind: &str,
    ) -> Result<T, StoreError> {
        let path = self.entity_path(dir, id);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("{kind} {id}")));
        }
        let data = fs::read(&path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_slice(&data).map_err(|e| StoreError::Corrupted(e.to_string()))
    }
}

#[async_trait]
impl DirectoryStore for FileDirectoryStore {
    async fn create_vasp(&self, vasp: &Vasp) -> Result<(), StoreError> {
        {
            let mut index = self.index.write().unwrap();
            if index.common_names.contains_key(&vasp.common_name) {
                return Err(StoreError::AlreadyExists(vasp.common_name.clone()));
            }
            index.common_names.insert(vasp.common_name.clone(), vasp.id);
        }
        self.write_entity(VASP_DIR, &vasp.id, vasp).await?;
        self.save_index().await
    }

    async fn retrieve_vasp(&self, id: &Uuid) -> Result<Vasp, StoreError> {
        self.read_entity(VASP_DIR, id, "vasp").await
    }

    async fn update_vasp(&self, vasp: &Vasp) -> Result<(), StoreError> {
        let previous: Vasp = self.read_entity(VASP_DIR, &vasp.id, "vasp").await?;
        if previous.common_name != vasp.common_name {
            let mut index = self.index.write().unwrap();
            if index.common_names.contains_key(&vasp.common_name) {
                return Err(StoreError::AlreadyExists(vasp.common_name.clone()));
            }
            index.common_names.remove(&previous.common_name);
            index.common_names.insert(vasp.common_name.clone(), vasp.id);
        }
        self.write_entity(VASP_DIR, &vasp.id, vasp).await?;
        self.save_index().await
    }

    async fn lookup_vasp(&self, common_name: &str) -> Result<Vasp, StoreError> {
        let id = {
            let index = self.index.read().unwrap();
            *index
                .common_names
                .get(common_name)
                .ok_or_else(|| StoreError::NotFound(format!("vasp {common_name}")))?
        };
        self.retrieve_vasp(&id).await
    }

    async fn search_vasps(&self, query: &SearchQuery) -> Result<Vec<Vasp>, StoreError> {
        let ids: Vec<Uuid> = {
            let index = self.index.read().unwrap();
            index.common_names.values().copied().collect()
        };

        let mut results = Vec::new();
        for id in ids {
            let vasp = self.retrieve_vasp(&id).await?;
            if matches_query(&vasp, query) {
                results.push(vasp);
            }
        }
        results.sort_by_key(|v| v.common_name.clone());
        Ok(results)
    }

    async fn create_cert_req(&self, req: &CertificateRequest) -> Result<(), StoreError> {
        {
            let mut index = self.index.write().unwrap();
            if index.request_status.contains_key(&req.id) {
                return Err(StoreError::AlreadyExists(format!(
                    "certificate request {}",
                    req.id
                )));
            }
            index.request_status.insert(req.id, req.status);
        }
        self.write_entity(CERTREQ_DIR, &req.id, req).await?;
        self.save_index().await
    }

    async fn retrieve_cert_req(&self, id: &Uuid) -> Result<CertificateRequest, StoreError> {
        self.read_entity(CERTREQ_DIR, id, "certificate request").await
    }

    async fn update_cert_req(&self, req: &CertificateRequest) -> Result<(), StoreError> {
        {
            let mut index = self.index.write().unwrap();
            if !index.request_status.contains_key(&req.id) {
                return Err(StoreError::NotFound(format!("certificate request {}", req.id)));
            }
            index.request_status.insert(req.id, req.status);
        }
        self.write_entity(CERTREQ_DIR, &req.id, req).await?;
        self.save_index().await
    }

    async fn list_cert_reqs(
        &self,
        statuses: &[RequestStatus],
    ) -> Result<Vec<CertificateRequest>, StoreError> {
        let ids: Vec<Uuid> = {
            let index = self.index.read().unwrap();
            index
                .request_status
                .iter()
                .filter(|(_, status)| statuses.is_empty() || statuses.contains(status))
                .map(|(id, _)| *id)
                .collect()
        };

        let mut results = Vec::new();
        for id in ids {
            results.push(self.retrieve_cert_req(&id).await?);
        }
        results.sort_by_key(|r| r.id);
        Ok(results)
    }

    async fn create_cert(&self, cert: &Certificate) -> Result<(), StoreError> {
        self.write_entity(CERT_DIR, &cert.id, cert).await
    }

    async fn retrieve_cert(&self, id: &Uuid) -> Result<Certificate, StoreError> {
        self.read_entity(CERT_DIR, id, "certificate").await
    }
}
