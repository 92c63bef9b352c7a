//! Certificate authority port
//!
//! The commercial CA operates a batch API: a request maps to exactly one
//! batch, which is created, polled, and finally downloaded as a
//! password-protected PKCS#12 bundle. Every transport failure is
//! transient from the core's perspective and leaves request state
//! unchanged.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// CA batch status values the core acts on. Anything else is treated as
/// an opaque "still active" status.
pub mod status {
    pub const READY_FOR_DOWNLOAD: &str = "READY_FOR_DOWNLOAD";
    pub const REJECTED: &str = "REJECTED";
    pub const NOT_ACCEPTABLE: &str = "NOT_ACCEPTABLE";
}

/// Batch parameter carrying the certificate common name
pub const PARAM_COMMON_NAME: &str = "commonName";

/// Batch parameter carrying the PKCS#12 encryption password
pub const PARAM_PKCS12_PASSWORD: &str = "pkcs12Password";

/// Result of creating a batch
#[derive(Debug, Clone)]
pub struct BatchInfo {
    pub batch_id: i64,
    /// Issuing authority the CA assigned the batch to
    pub authority_id: i64,
    pub order_number: i64,
    /// RFC3339 creation timestamp reported by the CA
    pub creation_date: String,
    pub status: String,
}

/// Detailed batch state
#[derive(Debug, Clone, Default)]
pub struct BatchDetail {
    pub batch_id: i64,
    pub batch_name: String,
    pub status: String,
    pub reject_reason: Option<String>,
}

/// Per-batch enrollment counters
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessingInfo {
    pub active: i64,
    pub success: i64,
    pub failed: i64,
}

/// CA-specific errors
#[derive(Debug, Error)]
pub enum CaError {
    /// Timeout, 5xx, connection failure; retried on the next tick
    #[error("ca transport error: {0}")]
    Transport(String),

    /// The CA answered but the payload could not be decoded
    #[error("ca protocol error: {0}")]
    Protocol(String),

    /// Authentication against the CA failed
    #[error("ca authentication error: {0}")]
    Authentication(String),
}

/// Port for the external certificate authority
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Remaining licenses available to the account
    async fn user_available_balance(&self) -> Result<i64, CaError>;

    /// Create an enrollment batch under the named profile
    async fn create_batch(
        &self,
        profile: &str,
        params: &HashMap<String, String>,
    ) -> Result<BatchInfo, CaError>;

    /// Full batch detail, including rejection reasons
    async fn batch_detail(&self, batch_id: i64) -> Result<BatchDetail, CaError>;

    /// Bare batch status; fallback when the detail cannot render one
    async fn batch_status(&self, batch_id: i64) -> Result<String, CaError>;

    /// Active/success/failure counters for the batch
    async fn batch_processing_info(&self, batch_id: i64) -> Result<ProcessingInfo, CaError>;

    /// Download the PKCS#12 bundle of a completed batch
    async fn download(&self, batch_id: i64) -> Result<Vec<u8>, CaError>;
}
