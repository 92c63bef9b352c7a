//! VASP registration record and its verification state machine
//!
//! State Transitions:
//! - NoVerification → Submitted (registration received)
//! - Submitted → EmailVerified (first contact verified)
//! - EmailVerified → PendingReview (admin review mail attempted)
//! - PendingReview → Reviewed (admin approve)
//! - Reviewed → IssuingCertificate (certificate manager pickup)
//! - IssuingCertificate → Verified (certificate delivered)
//! - Any non-terminal → Rejected (admin reject - terminal)
//! - Verified → Revoked
//!
//! Invariants:
//! - A contact with a non-empty verification token is unverified
//! - Tokens are single use; clearing the token marks the contact verified
//! - One audit entry per transition, monotonic timestamps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{next_audit_timestamp, CertificateDetails, StateError};

/// Verification lifecycle of a VASP registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Record created but registration not yet received
    NoVerification,
    /// Registration accepted, awaiting contact email verification
    Submitted,
    /// At least one contact verified their email address
    EmailVerified,
    /// Review request delivered, awaiting an administrator decision
    PendingReview,
    /// Administrator approved the registration
    Reviewed,
    /// Certificate manager owns the record while the CA issues
    IssuingCertificate,
    /// Identity certificate delivered (success terminal)
    Verified,
    /// Administrator or pipeline rejected the registration (terminal)
    Rejected,
    /// Previously verified membership has been revoked
    Revoked,
}

impl VerificationStatus {
    /// Wire name of the status, e.g. `PENDING_REVIEW`
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::NoVerification => "NO_VERIFICATION",
            VerificationStatus::Submitted => "SUBMITTED",
            VerificationStatus::EmailVerified => "EMAIL_VERIFIED",
            VerificationStatus::PendingReview => "PENDING_REVIEW",
            VerificationStatus::Reviewed => "REVIEWED",
            VerificationStatus::IssuingCertificate => "ISSUING_CERTIFICATE",
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::Rejected => "REJECTED",
            VerificationStatus::Revoked => "REVOKED",
        }
    }

    /// Is this a terminal state (no further transitions allowed)?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Rejected | VerificationStatus::Revoked
        )
    }

    /// May the certificate manager submit a request for a VASP in this state?
    pub fn submission_eligible(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Reviewed
                | VerificationStatus::IssuingCertificate
                | VerificationStatus::Verified
        )
    }

    /// Can we transition from the current state to the target state?
    pub fn can_transition_to(&self, target: &VerificationStatus) -> bool {
        match (self, target) {
            (VerificationStatus::NoVerification, VerificationStatus::Submitted) => true,
            (VerificationStatus::Submitted, VerificationStatus::EmailVerified) => true,
            (VerificationStatus::EmailVerified, VerificationStatus::PendingReview) => true,
            (VerificationStatus::PendingReview, VerificationStatus::Reviewed) => true,
            (VerificationStatus::Reviewed, VerificationStatus::IssuingCertificate) => true,
            (VerificationStatus::IssuingCertificate, VerificationStatus::Verified) => true,
            (VerificationStatus::Verified, VerificationStatus::Revoked) => true,
            (_, VerificationStatus::Rejected) if !self.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record of a VASP state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the transition happened
    pub timestamp: DateTime<Utc>,
    /// State before the transition
    pub previous: VerificationStatus,
    /// State after the transition
    pub current: VerificationStatus,
    /// Email address of the actor, or the literal `"automated"`
    pub source: String,
    /// Human-readable reason for the transition
    pub reason: String,
}

/// Business category of the registering VASP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusinessCategory {
    #[default]
    UnknownEntity,
    PrivateOrganization,
    GovernmentEntity,
    BusinessEntity,
    NonCommercialEntity,
}

impl BusinessCategory {
    /// Wire name of the category, e.g. `BUSINESS_ENTITY`
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessCategory::UnknownEntity => "UNKNOWN_ENTITY",
            BusinessCategory::PrivateOrganization => "PRIVATE_ORGANIZATION",
            BusinessCategory::GovernmentEntity => "GOVERNMENT_ENTITY",
            BusinessCategory::BusinessEntity => "BUSINESS_ENTITY",
            BusinessCategory::NonCommercialEntity => "NON_COMMERCIAL_ENTITY",
        }
    }
}

/// IVMS101 legal person subset carried on the registration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegalPerson {
    /// Registered legal name
    pub name: String,
    /// ISO-3166-1 alpha-2 country of registration
    #[serde(default)]
    pub country: String,
}

/// TRIXO questionnaire subset retained with the registration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrixoQuestionnaire {
    /// Primary national jurisdiction (ISO-3166-1 alpha-2)
    #[serde(default)]
    pub primary_national_jurisdiction: String,
    /// Whether the organization is permitted to send/receive transfers
    #[serde(default)]
    pub financial_transfers_permitted: String,
    /// Whether a travel-rule compliance program is required
    #[serde(default)]
    pub must_comply_travel_rule: bool,
    /// Whether KYC is conducted before transacting
    #[serde(default)]
    pub conducts_customer_kyc: bool,
}

/// A single outbound email recorded on a contact's send log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailLogEntry {
    /// When the message was handed to the transport
    pub timestamp: DateTime<Utc>,
    /// Template identifier, e.g. `verify_contact`
    pub reason: String,
    /// Subject line as sent
    pub subject: String,
    /// Recipient address as sent
    pub recipient: String,
    /// Dedupe reference: the token or certificate request this mail was for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Contact slot names, in the courier's fixed iteration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Legal,
    Administrative,
    Technical,
    Billing,
}

impl ContactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactKind::Legal => "legal",
            ContactKind::Administrative => "administrative",
            ContactKind::Technical => "technical",
            ContactKind::Billing => "billing",
        }
    }
}

/// A named contact on the VASP record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    /// Full name
    #[serde(default)]
    pub name: String,
    /// Email address, required for verification
    #[serde(default)]
    pub email: String,
    /// Phone number
    #[serde(default)]
    pub phone: String,
    /// Outstanding verification token; present means unverified
    #[serde(rename = "token", default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    /// Set when the token was redeemed
    #[serde(default)]
    pub verified: bool,
    /// Append-only log of mail sent to this contact
    #[serde(rename = "email-log", default)]
    pub email_log: Vec<EmailLogEntry>,
}

impl Contact {
    /// A contact is zero when every payload field is empty
    pub fn is_zero(&self) -> bool {
        self.name.is_empty() && self.email.is_empty() && self.phone.is_empty()
    }

    /// Has this contact redeemed a verification token?
    pub fn is_verified(&self) -> bool {
        self.verified && self.verification_token.is_none()
    }
}

/// The four named contact slots of a VASP record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrative: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal: Option<Contact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing: Option<Contact>,
}

impl Contacts {
    /// Iterate present contacts in the courier's fixed order:
    /// legal, administrative, technical, billing.
    pub fn iter_ordered(&self) -> impl Iterator<Item = (ContactKind, &Contact)> {
        [
            (ContactKind::Legal, self.legal.as_ref()),
            (ContactKind::Administrative, self.administrative.as_ref()),
            (ContactKind::Technical, self.technical.as_ref()),
            (ContactKind::Billing, self.billing.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, contact)| contact.map(|c| (kind, c)))
    }

    /// Mutable variant of [`iter_ordered`](Self::iter_ordered)
    pub fn iter_ordered_mut(&mut self) -> impl Iterator<Item = (ContactKind, &mut Contact)> {
        [
            (ContactKind::Legal, self.legal.as_mut()),
            (ContactKind::Administrative, self.administrative.as_mut()),
            (ContactKind::Technical, self.technical.as_mut()),
            (ContactKind::Billing, self.billing.as_mut()),
        ]
        .into_iter()
        .filter_map(|(kind, contact)| contact.map(|c| (kind, c)))
    }

    /// Replace contacts whose payload is entirely empty with `None`
    pub fn normalize(&mut self) {
        for slot in [
            &mut self.administrative,
            &mut self.technical,
            &mut self.legal,
            &mut self.billing,
        ] {
            if slot.as_ref().is_some_and(|c| c.is_zero()) {
                *slot = None;
            }
        }
    }

    /// Is there at least one contact carrying an email address?
    pub fn has_email(&self) -> bool {
        self.iter_ordered().any(|(_, c)| !c.email.is_empty())
    }

    /// Has any contact already redeemed a verification token?
    pub fn any_verified(&self) -> bool {
        self.iter_ordered().any(|(_, c)| c.is_verified())
    }
}

/// One directory member: a registered Virtual Asset Service Provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vasp {
    /// Stable identifier
    pub id: Uuid,
    /// Directory that owns this record
    pub registered_directory: String,
    /// Certificate common name; unique across the directory
    pub common_name: String,
    /// Network endpoint of form `host:port`
    pub endpoint: String,
    /// IVMS101 legal person payload
    pub entity: LegalPerson,
    /// Organization website
    #[serde(default)]
    pub website: String,
    /// Business category
    #[serde(default)]
    pub business_category: BusinessCategory,
    /// Free-form VASP category labels
    #[serde(default)]
    pub vasp_categories: Vec<String>,
    /// Date the business was established (YYYY-MM-DD)
    #[serde(default)]
    pub established_on: String,
    /// TRIXO questionnaire answers
    #[serde(default)]
    pub trixo: TrixoQuestionnaire,
    /// Named contact slots
    pub contacts: Contacts,
    /// Verification lifecycle state
    pub verification_status: VerificationStatus,
    /// When the VASP reached `Verified`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_on: Option<DateTime<Utc>>,
    /// Identity certificate, populated on successful issuance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_certificate: Option<CertificateDetails>,
    /// Append-only history of issued certificates
    #[serde(default)]
    pub signing_certificates: Vec<CertificateDetails>,
    /// When the record was first written
    pub first_listed: DateTime<Utc>,
    /// Last mutation timestamp
    pub last_updated: DateTime<Utc>,

    // Extra-data side tables, keyed by well-known strings on the wire.
    /// Certificate requests raised for this VASP
    #[serde(rename = "certificate-request-ids", default)]
    pub certificate_request_ids: Vec<Uuid>,
    /// Certificates issued to this VASP
    #[serde(rename = "certificate-ids", default)]
    pub certificate_ids: Vec<Uuid>,
    /// Outstanding admin review token
    #[serde(
        rename = "admin-verification-token",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub admin_verification_token: Option<String>,
    /// Append-only state transition log
    #[serde(rename = "audit-log", default)]
    pub audit_log: Vec<AuditEntry>,
}

impl Vasp {
    /// Create a new record in `NoVerification`; the caller transitions it
    /// to `Submitted` once the registration is accepted.
    pub fn new(
        registered_directory: String,
        common_name: String,
        endpoint: String,
        entity: LegalPerson,
        contacts: Contacts,
    ) -> Self {
        let now = Utc::now();
        Vasp {
            id: Uuid::new_v4(),
            registered_directory,
            common_name,
            endpoint,
            entity,
            website: String::new(),
            business_category: BusinessCategory::default(),
            vasp_categories: Vec::new(),
            established_on: String::new(),
            trixo: TrixoQuestionnaire::default(),
            contacts,
            verification_status: VerificationStatus::NoVerification,
            verified_on: None,
            identity_certificate: None,
            signing_certificates: Vec::new(),
            first_listed: now,
            last_updated: now,
            certificate_request_ids: Vec::new(),
            certificate_ids: Vec::new(),
            admin_verification_token: None,
            audit_log: Vec::new(),
        }
    }

    /// Apply a verification state transition.
    ///
    /// Validates against the transition table, appends one audit entry
    /// and stamps `verified_on` when the VASP reaches `Verified`.
    pub fn set_status(
        &mut self,
        next: VerificationStatus,
        source: &str,
        reason: &str,
    ) -> Result<(), StateError> {
        let current = self.verification_status;
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
        self.audit_log.push(AuditEntry {
            timestamp,
            previous: current,
            current: next,
            source: source.to_string(),
            reason: reason.to_string(),
        });
        self.verification_status = next;
        self.last_updated = timestamp;
        if next == VerificationStatus::Verified {
            self.verified_on = Some(timestamp);
        }
        Ok(())
    }

    /// Redeem a contact verification token.
    ///
    /// On an exact match the token is cleared and the contact marked
    /// verified. Returns the matched contact's kind and email, or `None`
    /// when no outstanding token matches (tokens are single use, so a
    /// replay also lands here).
    pub fn verify_contact(&mut self, token: &str) -> Option<(ContactKind, String)> {
        for (kind, contact) in self.contacts.iter_ordered_mut() {
            if contact.verification_token.as_deref() == Some(token) {
                contact.verification_token = None;
                contact.verified = true;
                return Some((kind, contact.email.clone()));
            }
        }
        None
    }
}
