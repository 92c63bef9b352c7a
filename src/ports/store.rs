//! Directory store port
//!
//! Typed CRUD over the three entities plus secondary-index search.
//! Writes are atomic at single-record granularity only; callers achieve
//! cross-record consistency by ordering writes so partial completion is
//! safe on retry (write the child before linking it from the parent,
//! write the parent's new status last).

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Certificate, CertificateRequest, RequestStatus, Vasp};

/// Search query: indexed field name to candidate values.
///
/// A record matches when, for every supplied key, its indexed value is
/// in that key's candidate list (conjunction over keys, disjunction
/// within each key). Indexed fields: `name`, `website`, `country`,
/// `business_category`, `vasp_category`, `common_name`.
pub type SearchQuery = HashMap<String, Vec<String>>;

/// Store-specific errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted record: {0}")]
    Corrupted(String),

    #[error("storage io error: {0}")]
    Io(String),
}

/// Evaluate a record against the standard index semantics.
///
/// Shared by the store adapters so both apply the same conjunction /
/// disjunction rule. Candidate matching is case-insensitive; an unknown
/// index key matches nothing.
pub fn matches_query(vasp: &Vasp, query: &SearchQuery) -> bool {
    query.iter().all(|(field, candidates)| {
        let hit = |value: &str| {
            !value.is_empty() && candidates.iter().any(|c| c.eq_ignore_ascii_case(value))
        };
        match field.as_str() {
            "name" => hit(&vasp.entity.name),
            "website" => hit(&vasp.website),
            "country" => hit(&vasp.entity.country),
            "business_category" => hit(vasp.business_category.as_str()),
            "vasp_category" => vasp.vasp_categories.iter().any(|v| hit(v)),
            "common_name" => hit(&vasp.common_name),
            _ => false,
        }
    })
}

/// Port for durable entity storage
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Persist a new VASP; enforces common-name uniqueness
    async fn create_vasp(&self, vasp: &Vasp) -> Result<(), StoreError>;

    /// Fetch a VASP by id
    async fn retrieve_vasp(&self, id: &Uuid) -> Result<Vasp, StoreError>;

    /// Replace a VASP record
    async fn update_vasp(&self, vasp: &Vasp) -> Result<(), StoreError>;

    /// Fetch a VASP through the unique common-name index
    async fn lookup_vasp(&self, common_name: &str) -> Result<Vasp, StoreError>;

    /// Secondary-index search, see [`SearchQuery`]
    async fn search_vasps(&self, query: &SearchQuery) -> Result<Vec<Vasp>, StoreError>;

    /// Persist a new certificate request
    async fn create_cert_req(&self, req: &CertificateRequest) -> Result<(), StoreError>;

    /// Fetch a certificate request by id
    async fn retrieve_cert_req(&self, id: &Uuid) -> Result<CertificateRequest, StoreError>;

    /// Replace a certificate request record
    async fn update_cert_req(&self, req: &CertificateRequest) -> Result<(), StoreError>;

    /// List certificate requests whose status is in the given set;
    /// an empty set lists everything
    async fn list_cert_reqs(
        &self,
        statuses: &[RequestStatus],
    ) -> Result<Vec<CertificateRequest>, StoreError>;

    /// Persist a new certificate record
    async fn create_cert(&self, cert: &Certificate) -> Result<(), StoreError>;

    /// Fetch a certificate by id
    async fn retrieve_cert(&self, id: &Uuid) -> Result<Certificate, StoreError>;
}
