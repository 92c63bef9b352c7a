//! Issued certificate records
//!
//! A Certificate is metadata only; the PKCS#12 bundle itself lives in
//! the secret vault under the originating request's scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of an issued certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Issued,
    Revoked,
}

/// Parsed X.509 subject/issuer/validity/fingerprint data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateDetails {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number, hex encoded
    pub serial_number: String,
    /// Validity start
    pub not_before: DateTime<Utc>,
    /// Validity end
    pub not_after: DateTime<Utc>,
    /// SHA-256 fingerprint of the DER certificate, hex encoded
    pub fingerprint: String,
}

/// Immutable record of a successfully issued identity certificate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    /// Stable identifier
    pub id: Uuid,
    /// Request this certificate was issued for
    pub request: Uuid,
    /// VASP this certificate belongs to
    pub vasp: Uuid,
    /// Issued or revoked
    pub status: CertificateStatus,
    /// Parsed leaf certificate data
    pub details: CertificateDetails,
}

impl Certificate {
    /// Record a freshly issued certificate
    pub fn new(request: Uuid, vasp: Uuid, details: CertificateDetails) -> Self {
        Certificate {
            id: Uuid::new_v4(),
            request,
            vasp,
            status: CertificateStatus::Issued,
            details,
        }
    }
}
