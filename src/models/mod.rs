//! Domain entities for the directory service
//!
//! Each entity carries its own lifecycle state machine; state is only
//! ever mutated through `set_status`, which validates the transition and
//! appends exactly one audit entry. The extra-data side tables the wire
//! schema cannot carry as first-class fields (tokens, audit logs, id
//! lists) are modeled as real fields here and serialized under their
//! well-known keys.

pub mod certificate;
pub mod request;
pub mod vasp;

pub use certificate::{Certificate, CertificateDetails, CertificateStatus};
pub use request::{CertificateRequest, RequestAuditEntry, RequestStatus};
pub use vasp::{
    AuditEntry, BusinessCategory, Contact, ContactKind, Contacts, EmailLogEntry, LegalPerson,
    TrixoQuestionnaire, Vasp, VerificationStatus,
};

use chrono::{DateTime, Duration, Utc};

/// Audit source recorded when no human actor drove a transition
pub const AUTOMATED: &str = "automated";

/// Errors raised by entity state machines
#[derive(Debug, Clone, thiserror::Error)]
pub enum StateError {
    #[error("invalid state transition from {current} to {next}")]
    InvalidTransition { current: String, next: String },

    #[error("terminal state reached: {0}")]
    TerminalState(String),
}

/// Next audit timestamp, strictly after the previous entry.
///
/// Audit logs require strictly monotonic timestamps; two transitions in
/// the same instant get nudged forward by a microsecond.
pub(crate) fn next_audit_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match last {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}
