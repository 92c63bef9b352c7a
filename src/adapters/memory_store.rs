//! In-memory directory store adapter for testing
//!
//! Implements the DirectoryStore port over `Arc<RwLock<HashMap>>` state.
//! Single-record atomicity falls out of the lock; the common-name index
//! is kept alongside the primary map.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::models::{Certificate, CertificateRequest, RequestStatus, Vasp};
use crate::ports::store::{matches_query, DirectoryStore, SearchQuery, StoreError};

/// In-memory directory store adapter for testing and development
#[derive(Clone, Default)]
pub struct MemoryDirectoryStore {
    vasps: Arc<RwLock<HashMap<Uuid, Vasp>>>,
    common_names: Arc<RwLock<HashMap<String, Uuid>>>,
    cert_reqs: Arc<RwLock<HashMap<Uuid, CertificateRequest>>>,
    certs: Arc<RwLock<HashMap<Uuid, Certificate>>>,
}

impl MemoryDirectoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all records (for test isolation)
    pub fn clear(&self) {
        self.vasps.write().unwrap().clear();
        self.common_names.write().unwrap().clear();
        self.cert_reqs.write().unwrap().clear();
        self.certs.write().unwrap().clear();
    }

    /// Number of stored VASP records (for testing/debugging)
    pub fn vasp_count(&self) -> usize {
        self.vasps.read().unwrap().len()
    }

    /// Number of stored certificate records (for testing/debugging)
    pub fn cert_count(&self) -> usize {
        self.certs.read().unwrap().len()
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectoryStore {
    async fn create_vasp(&self, vasp: &Vasp) -> Result<(), StoreError> {
        // lock order matches update_vasp: vasps before common_names
        let mut vasps = self.vasps.write().unwrap();
        let mut names = self.common_names.write().unwrap();
        if names.contains_key(&vasp.common_name) {
            return Err(StoreError::AlreadyExists(vasp.common_name.clone()));
        }
        names.insert(vasp.common_name.clone(), vasp.id);
        vasps.insert(vasp.id, vasp.clone());
        Ok(())
    }

    async fn retrieve_vasp(&self, id: &Uuid) -> Result<Vasp, StoreError> {
        self.vasps
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("vasp {id}")))
    }

    async fn update_vasp(&self, vasp: &Vasp) -> Result<(), StoreError> {
        let mut vasps = self.vasps.write().unwrap();
        let previous = vasps
            .get(&vasp.id)
            .ok_or_else(|| StoreError::NotFound(format!("vasp {}", vasp.id)))?;

        if previous.common_name != vasp.common_name {
            let mut names = self.common_names.write().unwrap();
            if names.contains_key(&vasp.common_name) {
                return Err(StoreError::AlreadyExists(vasp.common_name.clone()));
            }
            names.remove(&previous.common_name);
            names.insert(vasp.common_name.clone(), vasp.id);
        }
        vasps.insert(vasp.id, vasp.clone());
        Ok(())
    }

    async fn lookup_vasp(&self, common_name: &str) -> Result<Vasp, StoreError> {
        let id = *self
            .common_names
            .read()
            .unwrap()
            .get(common_name)
            .ok_or_else(|| StoreError::NotFound(format!("vasp {common_name}")))?;
        self.retrieve_vasp(&id).await
    }

    async fn search_vasps(&self, query: &SearchQuery) -> Result<Vec<Vasp>, StoreError> {
        let vasps = self.vasps.read().unwrap();
        let mut results: Vec<Vasp> = vasps
            .values()
            .filter(|v| matches_query(v, query))
            .cloned()
            .collect();
        results.sort_by_key(|v| v.common_name.clone());
        Ok(results)
    }

    async fn create_cert_req(&self, req: &CertificateRequest) -> Result<(), StoreError> {
        let mut reqs = self.cert_reqs.write().unwrap();
        if reqs.contains_key(&req.id) {
            return Err(StoreError::AlreadyExists(format!("certificate request {}", req.id)));
        }
        reqs.insert(req.id, req.clone());
        Ok(())
    }

    async fn retrieve_cert_req(&self, id: &Uuid) -> Result<CertificateRequest, StoreError> {
        self.cert_reqs
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("certificate request {id}")))
    }

    async fn update_cert_req(&self, req: &CertificateRequest) -> Result<(), StoreError> {
        let mut reqs = self.cert_reqs.write().unwrap();
        if !reqs.contains_key(&req.id) {
            return Err(StoreError::NotFound(format!("certificate request {}", req.id)));
        }
        reqs.insert(req.id, req.clone());
        Ok(())
    }

    async fn list_cert_reqs(
        &self,
        statuses: &[RequestStatus],
    ) -> Result<Vec<CertificateRequest>, StoreError> {
        let reqs = self.cert_reqs.read().unwrap();
        let mut results: Vec<CertificateRequest> = reqs
            .values()
            .filter(|r| statuses.is_empty() || statuses.contains(&r.status))
            .cloned()
            .collect();
        results.sort_by_key(|r| r.id);
        Ok(results)
    }

    async fn create_cert(&self, cert: &Certificate) -> Result<(), StoreError> {
        self.certs.write().unwrap().insert(cert.id, cert.clone());
        Ok(())
    }

    async fn retrieve_cert(&self, id: &Uuid) -> Result<Certificate, StoreError> {
        self.certs
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("certificate {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contacts, LegalPerson};

    fn sample_vasp(common_name: &str) -> Vasp {
        let mut vasp = Vasp::new(
            "trisa.directory".into(),
            common_name.into(),
            format!("{common_name}:443"),
            LegalPerson {
                name: "Example VASP Ltd".into(),
                country: "US".into(),
            },
            Contacts::default(),
        );
        vasp.website = "https://example.com".into();
        vasp
    }

    #[tokio::test]
    async fn test_common_name_uniqueness() {
        let store = MemoryDirectoryStore::new();
        let vasp = sample_vasp("alpha.example.com");
        store.create_vasp(&vasp).await.unwrap();

        let duplicate = sample_vasp("alpha.example.com");
        let err = store.create_vasp(&duplicate).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_lookup_by_common_name() {
        let store = MemoryDirectoryStore::new();
        let vasp = sample_vasp("alpha.example.com");
        store.create_vasp(&vasp).await.unwrap();

        let found = store.lookup_vasp("alpha.example.com").await.unwrap();
        assert_eq!(found.id, vasp.id);
        assert!(store.lookup_vasp("missing.example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_search_conjunction_and_disjunction() {
        let store = MemoryDirectoryStore::new();
        let mut a = sample_vasp("alpha.example.com");
        a.entity.country = "US".into();
        let mut b = sample_vasp("bravo.example.com");
        b.entity.country = "DE".into();
        store.create_vasp(&a).await.unwrap();
        store.create_vasp(&b).await.unwrap();

        // disjunction within a key
        let mut query = SearchQuery::new();
        query.insert("country".into(), vec!["US".into(), "DE".into()]);
        assert_eq!(store.search_vasps(&query).await.unwrap().len(), 2);

        // conjunction over keys
        query.insert("common_name".into(), vec!["alpha.example.com".into()]);
        let results = store.search_vasps(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].common_name, "alpha.example.com");
    }

    #[tokio::test]
    async fn test_list_cert_reqs_by_status() {
        let store = MemoryDirectoryStore::new();
        let mut req = CertificateRequest::new(Uuid::new_v4(), "alpha.example.com".into(), "EE".into());
        req.set_status(RequestStatus::ReadyToSubmit, "automated", "ready")
            .unwrap();
        store.create_cert_req(&req).await.unwrap();

        let ready = store
            .list_cert_reqs(&[RequestStatus::ReadyToSubmit])
            .await
            .unwrap();
        assert_eq!(ready.len(), 1);

        let processing = store
            .list_cert_reqs(&[RequestStatus::Processing])
            .await
            .unwrap();
        assert!(processing.is_empty());
    }
}
