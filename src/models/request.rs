//! Certificate request record and its issuance state machine
//!
//! One CertificateRequest exists per (VASP, issuance attempt). The
//! registration surface creates it and hands it over in `ReadyToSubmit`;
//! from then on the certificate manager is the only writer.
//!
//! State Transitions:
//! - Initialized → ReadyToSubmit (registration complete)
//! - ReadyToSubmit → Processing (CA batch created)
//! - Processing → Processing (self-transition, audits CA status changes)
//! - Processing → Downloading (batch succeeded)
//! - Downloading → Downloaded → Completed
//! - ReadyToSubmit/Processing/Downloading → CrRejected | CrErrored

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{next_audit_timestamp, StateError};

/// Issuance lifecycle of a certificate request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Created, not yet eligible for submission
    Initialized,
    /// Handoff point: waiting for the certificate manager
    ReadyToSubmit,
    /// Submitted to the CA, batch active
    Processing,
    /// Batch succeeded, bundle retrieval in progress
    Downloading,
    /// Bundle stored and parsed
    Downloaded,
    /// Certificate delivered (success terminal)
    Completed,
    /// CA or pre-submission gate rejected the request (terminal)
    CrRejected,
    /// Batch was malformed or the bundle unusable (terminal)
    CrErrored,
}

impl RequestStatus {
    /// Wire name of the status, e.g. `READY_TO_SUBMIT`
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Initialized => "INITIALIZED",
            RequestStatus::ReadyToSubmit => "READY_TO_SUBMIT",
            RequestStatus::Processing => "PROCESSING",
            RequestStatus::Downloading => "DOWNLOADING",
            RequestStatus::Downloaded => "DOWNLOADED",
            RequestStatus::Completed => "COMPLETED",
            RequestStatus::CrRejected => "CR_REJECTED",
            RequestStatus::CrErrored => "CR_ERRORED",
        }
    }

    /// Is this a terminal state?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::CrRejected | RequestStatus::CrErrored
        )
    }

    /// Can we transition from the current state to the target state?
    ///
    /// `Processing → Processing` is deliberately legal: the manager
    /// audits material CA status changes as self-transitions so an
    /// operator can tell a stuck batch from an acknowledged one.
    pub fn can_transition_to(&self, target: &RequestStatus) -> bool {
        match (self, target) {
            (RequestStatus::Initialized, RequestStatus::ReadyToSubmit) => true,
            (RequestStatus::ReadyToSubmit, RequestStatus::Processing) => true,
            (RequestStatus::Processing, RequestStatus::Processing) => true,
            (RequestStatus::Processing, RequestStatus::Downloading) => true,
            (RequestStatus::Downloading, RequestStatus::Downloaded) => true,
            (RequestStatus::Downloaded, RequestStatus::Completed) => true,
            (
                RequestStatus::ReadyToSubmit
                | RequestStatus::Processing
                | RequestStatus::Downloading,
                RequestStatus::CrRejected | RequestStatus::CrErrored,
            ) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record of a request state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAuditEntry {
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
    /// State before the transition
    pub previous: RequestStatus,
    /// State after the transition
    pub current: RequestStatus,
    /// Email address of the actor, or the literal `"automated"`
    pub source: String,
    /// Human-readable reason for the transition
    pub reason: String,
}

/// One certificate issuance attempt for a VASP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRequest {
    /// Stable identifier; doubles as the vault scope
    pub id: Uuid,
    /// Owning VASP
    pub vasp: Uuid,
    /// Common name the certificate is issued for
    pub common_name: String,
    /// CA profile the batch is created under
    pub profile: String,
    /// Profile parameters forwarded to the CA
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// CA authority the batch was assigned to
    #[serde(default)]
    pub authority_id: i64,
    /// CA batch identifier, assigned on submission
    #[serde(default)]
    pub batch_id: i64,
    /// CA batch name, mirrored from batch detail
    #[serde(default)]
    pub batch_name: String,
    /// Last CA batch status observed
    #[serde(default)]
    pub batch_status: String,
    /// CA order number, assigned on submission
    #[serde(default)]
    pub order_number: i64,
    /// RFC3339 batch creation date reported by the CA
    #[serde(default)]
    pub creation_date: String,
    /// CA rejection reason, when the batch was rejected
    #[serde(default)]
    pub reject_reason: String,
    /// Issued certificate, set on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Uuid>,
    /// Issuance lifecycle state
    pub status: RequestStatus,
    /// Append-only state transition log
    #[serde(rename = "audit-log", default)]
    pub audit_log: Vec<RequestAuditEntry>,
}

impl CertificateRequest {
    /// Create a request in `Initialized` for the given VASP
    pub fn new(vasp: Uuid, common_name: String, profile: String) -> Self {
        CertificateRequest {
            id: Uuid::new_v4(),
            vasp,
            common_name,
            profile,
            params: HashMap::new(),
            authority_id: 0,
            batch_id: 0,
            batch_name: String::new(),
            batch_status: String::new(),
            order_number: 0,
            creation_date: String::new(),
            reject_reason: String::new(),
            certificate: None,
            status: RequestStatus::Initialized,
            audit_log: Vec::new(),
        }
    }

    /// Vault scope for this request's password and bundle
    pub fn scope(&self) -> String {
        self.id.to_string()
    }

    /// Apply a request state transition, appending one audit entry.
    pub fn set_status(
        &mut self,
        next: RequestStatus,
        source: &str,
        reason: &str,
    ) -> Result<(), StateError> {
        let current = self.status;
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }
        if !current.can_transition_to(&next) {
            return Err(StateError::InvalidTransition {
                current: current.to_string(),
                next: next.to_string(),
            });
        }

        let timestamp = next_audit_timestamp(self.audit_log.last().map(|e| e.timestamp));
        self.audit_log.push(RequestAuditEntry {
            timestamp,
            previous: current,
            current: next,
            source: source.to_string(),
            reason: reason.to_string(),
        });
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> CertificateRequest {
        CertificateRequest::new(
            Uuid::new_v4(),
            "trisa.example.com".into(),
            "CipherTrace EE".into(),
        )
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(RequestStatus::CrRejected.as_str(), "CR_REJECTED");
        let encoded = serde_json::to_string(&RequestStatus::ReadyToSubmit).unwrap();
        assert_eq!(encoded, "\"READY_TO_SUBMIT\"");
    }

    #[test]
    fn test_issuance_path() {
        let mut req = sample_request();
        req.set_status(RequestStatus::ReadyToSubmit, "automated", "registered")
            .unwrap();
        req.set_status(RequestStatus::Processing, "automated", "batch created")
            .unwrap();
        req.set_status(RequestStatus::Downloading, "automated", "batch succeeded")
            .unwrap();
        req.set_status(RequestStatus::Downloaded, "automated", "bundle stored")
            .unwrap();
        req.set_status(RequestStatus::Completed, "automated", "delivered")
            .unwrap();
        assert_eq!(req.audit_log.len(), 5);
        assert!(req.status.is_terminal());
    }

    #[test]
    fn test_processing_self_transition_audited() {
        let mut req = sample_request();
        req.set_status(RequestStatus::ReadyToSubmit, "automated", "registered")
            .unwrap();
        req.set_status(RequestStatus::Processing, "automated", "batch created")
            .unwrap();
        req.set_status(RequestStatus::Processing, "automated", "batch status: VALIDATED")
            .unwrap();
        assert_eq!(req.status, RequestStatus::Processing);
        assert_eq!(req.audit_log.len(), 3);
        let last = req.audit_log.last().unwrap();
        assert_eq!(last.previous, RequestStatus::Processing);
        assert_eq!(last.current, RequestStatus::Processing);
    }

    #[test]
    fn test_terminal_states_frozen() {
        let mut req = sample_request();
        req.set_status(RequestStatus::ReadyToSubmit, "automated", "registered")
            .unwrap();
        req.set_status(RequestStatus::CrRejected, "automated", "vasp not in valid state")
            .unwrap();
        let err = req
            .set_status(RequestStatus::Processing, "automated", "retry")
            .unwrap_err();
        assert!(matches!(err, StateError::TerminalState(_)));
    }

    #[test]
    fn test_initialized_cannot_skip_ready() {
        let req = sample_request();
        assert!(!req.status.can_transition_to(&RequestStatus::Processing));
        assert!(!req.status.can_transition_to(&RequestStatus::CrRejected));
    }
}
