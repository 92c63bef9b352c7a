//! Registration API
//!
//! Synchronous request path of the directory: accepts registrations,
//! drives the VASP verification state machine, and leaves a
//! CertificateRequest in `ReadyToSubmit` as the handoff to the
//! certificate manager. The manager owns a request from that state on;
//! this surface never touches one again.

use chrono::{DateTime, Duration, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::courier::EmailCourier;
use crate::error::{Error, Result};
use crate::models::{
    BusinessCategory, CertificateDetails, CertificateRequest, Contacts, LegalPerson,
    RequestStatus, TrixoQuestionnaire, Vasp, VerificationStatus, AUTOMATED,
};
use crate::ports::ca::PARAM_COMMON_NAME;
use crate::ports::store::{DirectoryStore, SearchQuery};
use crate::ports::vault::{SecretVault, SECRET_PASSWORD};
use crate::tokens;

/// Registration submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Network endpoint of form `host:port`
    pub endpoint: String,
    /// Certificate common name; derived from the endpoint host when empty
    #[serde(default)]
    pub common_name: String,
    /// IVMS101 legal person payload
    #[serde(default)]
    pub entity: LegalPerson,
    /// Contact slots; at least one contact must carry an email address
    #[serde(default)]
    pub contacts: Contacts,
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
}

/// Registration acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReply {
    /// Assigned VASP identifier
    pub id: Uuid,
    /// Directory that owns the record
    pub registered_directory: String,
    /// Common name the certificate will be issued for
    pub common_name: String,
    /// Verification status after registration
    pub status: VerificationStatus,
    /// Human-readable summary of what happens next
    pub message: String,
    /// PKCS#12 password, disclosed exactly once
    pub pkcs12password: String,
}

/// Selector for the read operations: id or common name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupRequest {
    /// VASP identifier
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Certificate common name
    #[serde(default)]
    pub common_name: Option<String>,
    /// Directory the record is expected in; informational
    #[serde(default)]
    pub registered_directory: Option<String>,
}

/// Public directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupReply {
    /// VASP identifier
    pub id: Uuid,
    /// Directory that owns the record
    pub registered_directory: String,
    /// Certificate common name
    pub common_name: String,
    /// Network endpoint
    pub endpoint: String,
    /// Identity certificate, when issued
    pub identity_certificate: Option<CertificateDetails>,
    /// Most recent signing certificate, when issued
    pub signing_certificate: Option<CertificateDetails>,
    /// Country of registration
    pub country: String,
    /// When the VASP reached `Verified`
    pub verified_on: Option<DateTime<Utc>>,
    /// Legal name
    pub name: String,
}

/// Secondary-index search over the directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Candidate legal names
    #[serde(default)]
    pub name: Vec<String>,
    /// Candidate websites
    #[serde(default)]
    pub website: Vec<String>,
    /// Candidate countries
    #[serde(default)]
    pub country: Vec<String>,
    /// Candidate business categories (wire names)
    #[serde(default)]
    pub business_category: Vec<String>,
    /// Candidate VASP category labels
    #[serde(default)]
    pub vasp_category: Vec<String>,
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// VASP identifier
    pub id: Uuid,
    /// Directory that owns the record
    pub registered_directory: String,
    /// Certificate common name
    pub common_name: String,
    /// Network endpoint
    pub endpoint: String,
}

/// Search results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReply {
    /// Matching directory entries
    pub results: Vec<SearchResult>,
}

/// Verification state of a registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReply {
    /// Verification lifecycle state
    pub verification_status: VerificationStatus,
    /// Endpoint health; probing is not performed by this service
    pub service_status: String,
    /// When the VASP reached `Verified`
    pub verified_on: Option<DateTime<Utc>>,
    /// When the record was first written
    pub first_listed: DateTime<Utc>,
    /// Last mutation timestamp
    pub last_updated: DateTime<Utc>,
}

/// Contact token redemption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyContactRequest {
    /// VASP identifier
    pub id: Uuid,
    /// Verification token from the contact's email
    pub token: String,
}

/// Contact token redemption result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyContactReply {
    /// Verification status after the redemption
    pub status: VerificationStatus,
    /// Human-readable confirmation
    pub message: String,
}

/// Health probe input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Number of probe attempts made by the caller
    #[serde(default)]
    pub attempts: u32,
    /// When the caller last probed
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Service availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Healthy,
    Maintenance,
}

/// Health probe reply with the next probe window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceState {
    /// Current availability
    pub status: ServiceStatus,
    /// Earliest time the caller should probe again
    pub not_before: DateTime<Utc>,
    /// Latest time the caller should probe again
    pub not_after: DateTime<Utc>,
}

/// Administrative review decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// VASP under review
    pub vasp_id: Uuid,
    /// Admin verification token from the review request mail
    pub admin_verification_token: String,
    /// Approve (true) or reject (false) the registration
    pub approve: bool,
    /// Reason recorded on rejection
    #[serde(default)]
    pub reject_reason: Option<String>,
    /// Email address of the reviewing administrator
    pub actor: String,
}

/// Review decision result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReply {
    /// Verification status after the decision
    pub status: VerificationStatus,
    /// Human-readable confirmation
    pub message: String,
}

/// The registration service
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn DirectoryStore>,
    vault: Arc<dyn SecretVault>,
    courier: EmailCourier,
    directory_id: String,
    profile: String,
    maintenance: bool,
}

impl Registry {
    /// Assemble the service over its collaborators
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        vault: Arc<dyn SecretVault>,
        courier: EmailCourier,
        config: &Config,
    ) -> Self {
        Registry {
            store,
            vault,
            courier,
            directory_id: config.directory_id.clone(),
            profile: config.sectigo.profile.clone(),
            maintenance: config.maintenance,
        }
    }

    fn check_maintenance(&self) -> Result<()> {
        if self.maintenance {
            return Err(Error::Aborted(
                "the directory is down for maintenance, retry later".into(),
            ));
        }
        Ok(())
    }

    /// Accept a registration and stage its certificate request.
    ///
    /// Side effects happen in a fixed order, each durable before the
    /// next: VASP created in `Submitted`, contact tokens persisted,
    /// certificate request staged in `ReadyToSubmit`, PKCS#12 password
    /// written to the vault, request linked onto the VASP, verification
    /// mail attempted. The reply discloses the password exactly once.
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterReply> {
        self.check_maintenance()?;

        validate_endpoint(&req.endpoint)?;
        let common_name = if req.common_name.is_empty() {
            endpoint_host(&req.endpoint).to_string()
        } else {
            req.common_name.clone()
        };
        validate_common_name(&common_name)?;

        let mut contacts = req.contacts;
        contacts.normalize();
        if !contacts.has_email() {
            return Err(Error::InvalidArgument(
                "at least one contact with an email address is required".into(),
            ));
        }

        let mut vasp = Vasp::new(
            self.directory_id.clone(),
            common_name.clone(),
            req.endpoint,
            req.entity,
            contacts,
        );
        vasp.website = req.website;
        vasp.business_category = req.business_category;
        vasp.vasp_categories = req.vasp_categories;
        vasp.established_on = req.established_on;
        vasp.trixo = req.trixo;
        vasp.set_status(VerificationStatus::Submitted, AUTOMATED, "registration received")?;
        self.store.create_vasp(&vasp).await?;

        // every remaining contact gets a single-use verification token
        for (_, contact) in vasp.contacts.iter_ordered_mut() {
            contact.verification_token = Some(tokens::secure_token());
            contact.verified = false;
        }
        self.store.update_vasp(&vasp).await.map_err(|e| {
            Error::Aborted(format!("could not persist contact verification tokens: {e}"))
        })?;

        let mut cert_req =
            CertificateRequest::new(vasp.id, common_name.clone(), self.profile.clone());
        cert_req
            .params
            .insert(PARAM_COMMON_NAME.to_string(), common_name.clone());
        cert_req.set_status(
            RequestStatus::ReadyToSubmit,
            AUTOMATED,
            "registration submitted, awaiting verification and review",
        )?;
        self.store.create_cert_req(&cert_req).await?;

        let password = tokens::pkcs12_password();
        let scope = cert_req.scope();
        self.vault
            .create(&scope, SECRET_PASSWORD)
            .await
            .map_err(|e| Error::Internal(format!("secret vault unavailable: {e}")))?;
        self.vault
            .add_version(&scope, SECRET_PASSWORD, password.expose_secret().as_bytes())
            .await
            .map_err(|e| Error::Internal(format!("secret vault unavailable: {e}")))?;

        vasp.certificate_request_ids.push(cert_req.id);
        self.store.update_vasp(&vasp).await?;

        // verification mail failure is logged, never fatal to registration
        let sent = self.courier.send_verify_contacts(&mut vasp).await;
        if sent > 0 {
            if let Err(e) = self.store.update_vasp(&vasp).await {
                warn!(vasp = %vasp.id, error = %e, "could not persist email send log");
            }
        }

        info!(vasp = %vasp.id, %common_name, "registration received");
        Ok(RegisterReply {
            id: vasp.id,
            registered_directory: vasp.registered_directory.clone(),
            common_name,
            status: vasp.verification_status,
            message: "registration received: verify contact email addresses to proceed"
                .to_string(),
            pkcs12password: password.expose_secret().to_string(),
        })
    }

    /// Fetch a single directory entry by id or common name
    pub async fn lookup(&self, req: LookupRequest) -> Result<LookupReply> {
        let vasp = self.select_vasp(&req).await?;
        Ok(LookupReply {
            id: vasp.id,
            registered_directory: vasp.registered_directory.clone(),
            common_name: vasp.common_name.clone(),
            endpoint: vasp.endpoint.clone(),
            identity_certificate: vasp.identity_certificate.clone(),
            signing_certificate: vasp.signing_certificates.last().cloned(),
            country: vasp.entity.country.clone(),
            verified_on: vasp.verified_on,
            name: vasp.entity.name,
        })
    }

    /// Search the directory over its secondary indices
    pub async fn search(&self, req: SearchRequest) -> Result<SearchReply> {
        let mut query = SearchQuery::new();
        for (key, values) in [
            ("name", req.name),
            ("website", req.website),
            ("country", req.country),
            ("business_category", req.business_category),
            ("vasp_category", req.vasp_category),
        ] {
            if !values.is_empty() {
                query.insert(key.to_string(), values);
            }
        }
        if query.is_empty() {
            return Ok(SearchReply { results: Vec::new() });
        }

        let vasps = self
            .store
            .search_vasps(&query)
            .await
            .map_err(|e| Error::Aborted(e.to_string()))?;
        Ok(SearchReply {
            results: vasps
                .into_iter()
                .map(|v| SearchResult {
                    id: v.id,
                    registered_directory: v.registered_directory,
                    common_name: v.common_name,
                    endpoint: v.endpoint,
                })
                .collect(),
        })
    }

    /// Report the verification state of a registration
    pub async fn verification(&self, req: LookupRequest) -> Result<VerificationReply> {
        let vasp = self.select_vasp(&req).await?;
        Ok(VerificationReply {
            verification_status: vasp.verification_status,
            service_status: "UNKNOWN".to_string(),
            verified_on: vasp.verified_on,
            first_listed: vasp.first_listed,
            last_updated: vasp.last_updated,
        })
    }

    /// Redeem a contact verification token.
    ///
    /// The first verified contact moves the VASP `Submitted →
    /// EmailVerified`, mints the admin verification token, attempts the
    /// review request mail, and lands in `PendingReview`. Later
    /// verifications leave the status untouched; a replayed token is
    /// NotFound because tokens are single use.
    pub async fn verify_contact(&self, req: VerifyContactRequest) -> Result<VerifyContactReply> {
        self.check_maintenance()?;
        if req.token.is_empty() {
            return Err(Error::InvalidArgument("token is required".into()));
        }

        let mut vasp = self.store.retrieve_vasp(&req.id).await?;
        let previously_verified = vasp.contacts.any_verified();

        let Some((kind, email)) = vasp.verify_contact(&req.token) else {
            return Err(Error::NotFound(
                "no contact matches the provided token".into(),
            ));
        };
        info!(vasp = %vasp.id, contact = kind.as_str(), "contact email verified");

        if previously_verified {
            self.store
                .update_vasp(&vasp)
                .await
                .map_err(|e| Error::Aborted(e.to_string()))?;
            return Ok(VerifyContactReply {
                status: vasp.verification_status,
                message: "email successfully verified".to_string(),
            });
        }

        let actor: &str = if email.is_empty() { AUTOMATED } else { email.as_str() };
        vasp.set_status(
            VerificationStatus::EmailVerified,
            actor,
            "first contact email verified",
        )?;
        vasp.admin_verification_token = Some(tokens::secure_token());

        let sent = self.courier.send_review_request(&mut vasp).await;
        if sent == 0 {
            warn!(vasp = %vasp.id, "review request mail could not be delivered");
        }
        vasp.set_status(
            VerificationStatus::PendingReview,
            AUTOMATED,
            "registration ready for administrative review",
        )?;

        self.store
            .update_vasp(&vasp)
            .await
            .map_err(|e| Error::Aborted(e.to_string()))?;
        Ok(VerifyContactReply {
            status: vasp.verification_status,
            message: "email successfully verified".to_string(),
        })
    }

    /// Apply an administrative review decision.
    ///
    /// Approval is only legal from `PendingReview`; any decision is
    /// refused while the certificate manager owns the VASP in
    /// `IssuingCertificate`.
    pub async fn review(&self, req: ReviewRequest) -> Result<ReviewReply> {
        self.check_maintenance()?;

        let mut vasp = self.store.retrieve_vasp(&req.vasp_id).await?;
        if vasp.verification_status == VerificationStatus::IssuingCertificate {
            return Err(Error::FailedPrecondition(
                "certificate issuance is in progress, retry after it completes".into(),
            ));
        }
        if vasp.admin_verification_token.as_deref() != Some(req.admin_verification_token.as_str())
        {
            return Err(Error::InvalidArgument(
                "invalid admin verification token".into(),
            ));
        }

        if req.approve {
            if vasp.verification_status != VerificationStatus::PendingReview {
                return Err(Error::FailedPrecondition(format!(
                    "cannot approve a registration in {}",
                    vasp.verification_status
                )));
            }
            vasp.admin_verification_token = None;
            vasp.set_status(VerificationStatus::Reviewed, &req.actor, "registration approved")?;
            self.store.update_vasp(&vasp).await?;
            info!(vasp = %vasp.id, actor = %req.actor, "registration approved");
            Ok(ReviewReply {
                status: vasp.verification_status,
                message: "registration approved, certificate issuance will begin shortly"
                    .to_string(),
            })
        } else {
            let reason = req
                .reject_reason
                .as_deref()
                .unwrap_or("registration rejected");
            vasp.admin_verification_token = None;
            vasp.set_status(VerificationStatus::Rejected, &req.actor, reason)?;
            self.store.update_vasp(&vasp).await?;
            info!(vasp = %vasp.id, actor = %req.actor, reason, "registration rejected");
            Ok(ReviewReply {
                status: vasp.verification_status,
                message: "registration rejected".to_string(),
            })
        }
    }

    /// Health probe with the caller's next probe window
    pub fn status(&self, _req: HealthCheck) -> ServiceState {
        let now = Utc::now();
        ServiceState {
            status: if self.maintenance {
                ServiceStatus::Maintenance
            } else {
                ServiceStatus::Healthy
            },
            not_before: now + Duration::minutes(30),
            not_after: now + Duration::minutes(60),
        }
    }

    async fn select_vasp(&self, req: &LookupRequest) -> Result<Vasp> {
        match (&req.id, &req.common_name) {
            (Some(id), _) => Ok(self.store.retrieve_vasp(id).await?),
            (None, Some(common_name)) if !common_name.is_empty() => {
                Ok(self.store.lookup_vasp(common_name).await?)
            }
            _ => Err(Error::InvalidArgument(
                "either id or common_name is required".into(),
            )),
        }
    }
}

/// Host portion of a validated `host:port` endpoint
fn endpoint_host(endpoint: &str) -> &str {
    endpoint.rsplit_once(':').map(|(host, _)| host).unwrap_or(endpoint)
}

/// Validate that the endpoint has the form `host:port` with a numeric port
fn validate_endpoint(endpoint: &str) -> Result<()> {
    let Some((host, port)) = endpoint.rsplit_once(':') else {
        return Err(Error::InvalidArgument(
            "endpoint must have the form host:port".into(),
        ));
    };
    if host.is_empty() {
        return Err(Error::InvalidArgument("endpoint host is required".into()));
    }
    if port.parse::<u16>().is_err() {
        return Err(Error::InvalidArgument(format!(
            "endpoint port is not numeric: {port}"
        )));
    }
    Ok(())
}

/// Validate a certificate common name: DNS labels only, no wildcard,
/// no scheme, no port.
fn validate_common_name(common_name: &str) -> Result<()> {
    if common_name.is_empty() {
        return Err(Error::InvalidArgument("common name is required".into()));
    }
    if common_name.len() > 253 {
        return Err(Error::InvalidArgument("common name is too long".into()));
    }
    if common_name.contains("://") {
        return Err(Error::InvalidArgument(
            "common name must not carry a scheme".into(),
        ));
    }
    if common_name.contains(':') {
        return Err(Error::InvalidArgument(
            "common name must not carry a port".into(),
        ));
    }
    if common_name.starts_with('*') {
        return Err(Error::InvalidArgument(
            "wildcard common names are not allowed".into(),
        ));
    }
    for label in common_name.split('.') {
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(Error::InvalidArgument(format!(
                "common name is not a valid DNS name: {common_name}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("trisa.example.com:443").is_ok());
        assert!(validate_endpoint("trisa.example.com").is_err());
        assert!(validate_endpoint(":443").is_err());
        assert!(validate_endpoint("trisa.example.com:https").is_err());
        assert!(validate_endpoint("trisa.example.com:70000").is_err());
    }

    #[test]
    fn test_validate_common_name() {
        assert!(validate_common_name("trisa.example.com").is_ok());
        assert!(validate_common_name("localhost").is_ok());
        assert!(validate_common_name("").is_err());
        assert!(validate_common_name("*.example.com").is_err());
        assert!(validate_common_name("https://example.com").is_err());
        assert!(validate_common_name("example.com:443").is_err());
        assert!(validate_common_name("-bad.example.com").is_err());
        assert!(validate_common_name("bad..example.com").is_err());
    }

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("trisa.example.com:443"), "trisa.example.com");
    }
}
