//! Certificate manager
//!
//! Single serialized background worker that drives every certificate
//! request from `ReadyToSubmit` to a terminal state by talking to the
//! external CA and the secret vault. At most one tick executes at a
//! time, so all mutations of a request past the handoff point are
//! serialized here and no per-request locking is needed.
//!
//! External failures are logged and retried on a later tick; only
//! contract violations in the store or vault propagate out of `run` so
//! the supervisor can shut the service down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::CertManConfig;
use crate::courier::EmailCourier;
use crate::error::{Error, Result};
use crate::models::{
    Certificate, CertificateRequest, RequestStatus, Vasp, VerificationStatus, AUTOMATED,
};
use crate::pkcs12;
use crate::ports::ca::{
    self, CertificateAuthority, PARAM_COMMON_NAME, PARAM_PKCS12_PASSWORD,
};
use crate::ports::store::DirectoryStore;
use crate::ports::vault::{SecretVault, VaultError, SECRET_CERT, SECRET_PASSWORD};

/// Background worker driving the certificate request state machine
pub struct CertificateManager {
    store: Arc<dyn DirectoryStore>,
    vault: Arc<dyn SecretVault>,
    ca: Arc<dyn CertificateAuthority>,
    courier: EmailCourier,
    interval: Duration,
    storage_dir: PathBuf,
}

impl CertificateManager {
    /// Assemble the manager over its collaborators
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        vault: Arc<dyn SecretVault>,
        ca: Arc<dyn CertificateAuthority>,
        courier: EmailCourier,
        config: &CertManConfig,
    ) -> Self {
        CertificateManager {
            store,
            vault,
            ca,
            courier,
            interval: config.interval(),
            storage_dir: config.storage.clone(),
        }
    }

    /// Run the tick loop until the shutdown signal fires.
    ///
    /// Returns an error only on a store or vault contract violation, in
    /// which case the caller is expected to stop the service.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "certificate manager started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "certificate manager halting");
                        return Err(e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("certificate manager stopping");
                    return Ok(());
                }
            }
        }
    }

    /// One full evaluation pass: drive submission states toward the CA,
    /// then submitted states toward download. Public so tests can step
    /// the machine without timing the loop.
    pub async fn tick(&self) -> Result<()> {
        self.process_submissions().await?;
        self.process_downloads().await?;
        Ok(())
    }

    /// Phase (a): requests in `ReadyToSubmit`
    async fn process_submissions(&self) -> Result<()> {
        let pending = match self.store.list_cert_reqs(&[RequestStatus::ReadyToSubmit]).await {
            Ok(pending) => pending,
            Err(e) => return self.tolerate("list submission requests", e.into()),
        };

        for mut req in pending {
            if let Err(e) = self.submit(&mut req).await {
                self.tolerate("submit certificate request", e)?;
            }
        }
        Ok(())
    }

    /// Phase (b): requests in `Processing` or `Downloading`
    async fn process_downloads(&self) -> Result<()> {
        let active = match self
            .store
            .list_cert_reqs(&[RequestStatus::Processing, RequestStatus::Downloading])
            .await
        {
            Ok(active) => active,
            Err(e) => return self.tolerate("list active requests", e.into()),
        };

        for mut req in active {
            let outcome = match req.status {
                RequestStatus::Processing => self.check_processing(&mut req).await,
                RequestStatus::Downloading => self.download(&mut req).await,
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                self.tolerate("process certificate request", e)?;
            }
        }
        Ok(())
    }

    /// Log-and-continue for external failures; propagate contract
    /// violations so the run loop halts.
    fn tolerate(&self, action: &str, err: Error) -> Result<()> {
        match err {
            Error::Internal(_) => Err(err),
            other => {
                warn!(error = %other, "could not {action}, will retry next tick");
                Ok(())
            }
        }
    }

    /// Evaluate one `ReadyToSubmit` request.
    ///
    /// The VASP is gated before any mutation: a VASP outside the
    /// submission-eligible states rejects the request without being
    /// touched itself. Once the gate passes, `Reviewed` is promoted to
    /// `IssuingCertificate` exactly once; missing passwords and an
    /// exhausted CA balance defer the request without degrading state.
    async fn submit(&self, req: &mut CertificateRequest) -> Result<()> {
        let mut vasp = self.store.retrieve_vasp(&req.vasp).await?;

        if !vasp.verification_status.submission_eligible() {
            warn!(
                request = %req.id, vasp = %vasp.id, status = %vasp.verification_status,
                "rejecting certificate request for ineligible vasp"
            );
            let reason = "vasp not in valid state for submission";
            req.reject_reason = reason.to_string();
            req.set_status(RequestStatus::CrRejected, AUTOMATED, reason)?;
            self.store.update_cert_req(req).await?;
            self.notify_rejection(&mut vasp, reason, req).await;
            return Ok(());
        }

        if vasp.verification_status == VerificationStatus::Reviewed {
            vasp.set_status(
                VerificationStatus::IssuingCertificate,
                AUTOMATED,
                "certificate issuance in progress",
            )?;
            self.store.update_vasp(&vasp).await?;
        }

        // the CA encrypts the bundle with this password, so submission
        // is pointless until it exists
        let password = match self.vault.latest_version(&req.scope(), SECRET_PASSWORD).await {
            Ok(bytes) => bytes,
            Err(VaultError::NotFound(_)) => {
                warn!(request = %req.id, "pkcs12 password missing, deferring submission");
                return Ok(());
            }
            Err(e) => return Err(Error::Internal(format!("secret vault failure: {e}"))),
        };
        let password = String::from_utf8(password)
            .map_err(|_| Error::Internal("stored pkcs12 password is not valid ascii".into()))?;

        let balance = match self.ca.user_available_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(request = %req.id, error = %e, "CA balance check failed, deferring");
                return Ok(());
            }
        };
        if balance <= 0 {
            warn!(request = %req.id, "CA account balance exhausted, deferring submission");
            return Ok(());
        }

        let mut params = req.params.clone();
        params.insert(PARAM_COMMON_NAME.to_string(), req.common_name.clone());
        params.insert(PARAM_PKCS12_PASSWORD.to_string(), password);

        let info = match self.ca.create_batch(&req.profile, &params).await {
            Ok(info) => info,
            Err(e) => {
                warn!(request = %req.id, error = %e, "CA batch creation failed, will retry");
                return Ok(());
            }
        };

        req.batch_id = info.batch_id;
        req.authority_id = info.authority_id;
        req.order_number = info.order_number;
        req.creation_date = info.creation_date;
        req.batch_status = info.status;
        req.set_status(
            RequestStatus::Processing,
            AUTOMATED,
            "certificate batch submitted to authority",
        )?;
        self.store.update_cert_req(req).await?;
        info!(request = %req.id, batch = req.batch_id, "certificate batch submitted");
        Ok(())
    }

    /// Evaluate one `Processing` request against the CA counters.
    async fn check_processing(&self, req: &mut CertificateRequest) -> Result<()> {
        let info = match self.ca.batch_processing_info(req.batch_id).await {
            Ok(info) => info,
            Err(e) => {
                // transient: state unchanged, no audit entry for a no-op tick
                debug!(request = %req.id, error = %e, "processing info unavailable");
                return Ok(());
            }
        };

        if info.success > 0 {
            req.set_status(
                RequestStatus::Downloading,
                AUTOMATED,
                "certificate batch ready for download",
            )?;
            self.store.update_cert_req(req).await?;
            // the bundle is usually ready the moment the batch succeeds
            return self.download(req).await;
        }

        if info.failed > 0 {
            let (status, reject_reason, batch_name) =
                match self.ca.batch_detail(req.batch_id).await {
                    Ok(detail) if !detail.status.is_empty() => {
                        (detail.status, detail.reject_reason, detail.batch_name)
                    }
                    _ => match self.ca.batch_status(req.batch_id).await {
                        Ok(status) => (status, None, String::new()),
                        Err(e) => {
                            debug!(request = %req.id, error = %e, "batch status unavailable");
                            return Ok(());
                        }
                    },
                };
            if !batch_name.is_empty() {
                req.batch_name = batch_name;
            }

            match status.as_str() {
                ca::status::REJECTED => {
                    req.batch_status = status;
                    req.reject_reason = reject_reason.clone().unwrap_or_default();
                    req.set_status(
                        RequestStatus::CrRejected,
                        AUTOMATED,
                        "certificate batch rejected by authority",
                    )?;
                    self.store.update_cert_req(req).await?;
                    warn!(request = %req.id, reason = %req.reject_reason, "batch rejected");

                    let reason = reject_reason
                        .unwrap_or_else(|| "the certificate authority rejected the request".into());
                    match self.store.retrieve_vasp(&req.vasp).await {
                        Ok(mut vasp) => self.notify_rejection(&mut vasp, &reason, req).await,
                        Err(e) => warn!(request = %req.id, error = %e, "vasp unavailable"),
                    }
                }
                ca::status::NOT_ACCEPTABLE => {
                    req.batch_status = status;
                    req.set_status(
                        RequestStatus::CrErrored,
                        AUTOMATED,
                        "certificate batch not acceptable to authority",
                    )?;
                    self.store.update_cert_req(req).await?;
                    warn!(request = %req.id, "batch not acceptable");
                }
                _ => self.mirror_status(req, &status).await?,
            }
            return Ok(());
        }

        // batch still active: mirror the CA status so operators can tell
        // a stuck request from an acknowledged one
        match self.ca.batch_detail(req.batch_id).await {
            Ok(detail) => {
                if !detail.batch_name.is_empty() {
                    req.batch_name = detail.batch_name.clone();
                }
                self.mirror_status(req, &detail.status).await
            }
            Err(_) => Ok(()),
        }
    }

    /// Record a materially changed CA status as an audited
    /// self-transition; a no-op when nothing changed.
    async fn mirror_status(&self, req: &mut CertificateRequest, status: &str) -> Result<()> {
        if status.is_empty() || status == req.batch_status {
            return Ok(());
        }
        req.batch_status = status.to_string();
        req.set_status(
            RequestStatus::Processing,
            AUTOMATED,
            &format!("certificate batch status changed: {status}"),
        )?;
        self.store.update_cert_req(req).await?;
        Ok(())
    }

    /// Evaluate one `Downloading` request: fetch the bundle and commit.
    ///
    /// Commit order matters for restart safety: bundle into the vault,
    /// certificate entity, VASP update, request transition last. A crash
    /// between any two steps re-enters download on the next tick.
    async fn download(&self, req: &mut CertificateRequest) -> Result<()> {
        let bundle = match self.ca.download(req.batch_id).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(request = %req.id, error = %e, "bundle download failed, will retry");
                return Ok(());
            }
        };

        let scope = req.scope();
        self.vault
            .create(&scope, SECRET_CERT)
            .await
            .map_err(|e| Error::Aborted(format!("vault unavailable: {e}")))?;
        self.vault
            .add_version(&scope, SECRET_CERT, &bundle)
            .await
            .map_err(|e| Error::Aborted(format!("vault unavailable: {e}")))?;

        // operator convenience only, never gates the commit
        if let Err(e) = self.archive_bundle(req, &bundle).await {
            warn!(request = %req.id, error = %e, "could not archive bundle to certs directory");
        }

        let password_bytes = self
            .vault
            .latest_version(&scope, SECRET_PASSWORD)
            .await
            .map_err(|e| Error::Aborted(format!("vault unavailable: {e}")))?;
        let password = String::from_utf8(password_bytes)
            .map_err(|_| Error::Internal("stored pkcs12 password is not valid ascii".into()))?;

        let details = match pkcs12::parse_bundle(&bundle, &password) {
            Ok(details) => details,
            Err(e) => {
                // re-downloading would fetch the same bytes forever; park
                // the request and leave the bundle in the vault for operators
                error!(request = %req.id, error = %e, "downloaded bundle is unusable");
                req.set_status(
                    RequestStatus::CrErrored,
                    AUTOMATED,
                    &format!("unable to decode pkcs12 bundle: {e}"),
                )?;
                self.store.update_cert_req(req).await?;
                return Ok(());
            }
        };

        let mut vasp = self.store.retrieve_vasp(&req.vasp).await?;
        let cert = Certificate::new(req.id, req.vasp, details.clone());
        self.store.create_cert(&cert).await?;

        vasp.identity_certificate = Some(details.clone());
        vasp.signing_certificates.push(details);
        vasp.certificate_ids.push(cert.id);
        if vasp.verification_status == VerificationStatus::IssuingCertificate {
            vasp.set_status(
                VerificationStatus::Verified,
                AUTOMATED,
                "identity certificate issued",
            )?;
        }
        self.store.update_vasp(&vasp).await?;

        req.certificate = Some(cert.id);
        req.set_status(RequestStatus::Downloaded, AUTOMATED, "certificate bundle stored")?;
        req.set_status(RequestStatus::Completed, AUTOMATED, "certificate issuance complete")?;
        self.store.update_cert_req(req).await?;

        let sent = self.courier.send_deliver_certs(&mut vasp, &req.id, &bundle).await;
        if sent > 0 {
            if let Err(e) = self.store.update_vasp(&vasp).await {
                warn!(vasp = %vasp.id, error = %e, "could not persist email send log");
            }
        }

        info!(
            request = %req.id, vasp = %vasp.id, certificate = %cert.id,
            "certificate issued and delivered"
        );
        Ok(())
    }

    /// Send rejection mail and persist the send log, best effort
    async fn notify_rejection(&self, vasp: &mut Vasp, reason: &str, req: &CertificateRequest) {
        let sent = self.courier.send_rejection(vasp, reason, &req.id).await;
        if sent > 0 {
            if let Err(e) = self.store.update_vasp(vasp).await {
                warn!(vasp = %vasp.id, error = %e, "could not persist email send log");
            }
        }
    }

    /// Write the downloaded bundle under the certs directory for
    /// operator inspection, one file per batch
    async fn archive_bundle(&self, req: &CertificateRequest, bundle: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.storage_dir).await?;
        let name = if req.batch_name.is_empty() {
            format!("batch-{}", req.batch_id)
        } else {
            req.batch_name.clone()
        };
        tokio::fs::write(self.storage_dir.join(format!("{name}.p12")), bundle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryDirectoryStore, MemoryMailTransport, MemorySecretVault};
    use crate::models::{Contact, Contacts, LegalPerson};
    use crate::ports::ca::{CaError, MockCertificateAuthority};

    fn eligible_fixture() -> (MemoryDirectoryStore, MemorySecretVault, Vasp, CertificateRequest)
    {
        let store = MemoryDirectoryStore::new();
        let vault = MemorySecretVault::new();

        let mut vasp = Vasp::new(
            "trisa.directory".into(),
            "trisa.example.com".into(),
            "trisa.example.com:443".into(),
            LegalPerson {
                name: "Example VASP Ltd".into(),
                country: "US".into(),
            },
            Contacts {
                legal: Some(Contact {
                    name: "Jane Doe".into(),
                    email: "legal@example.com".into(),
                    verified: true,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        vasp.set_status(VerificationStatus::Submitted, AUTOMATED, "registered").unwrap();
        vasp.set_status(VerificationStatus::EmailVerified, "legal@example.com", "verified")
            .unwrap();
        vasp.set_status(VerificationStatus::PendingReview, AUTOMATED, "review sent").unwrap();
        vasp.set_status(VerificationStatus::Reviewed, "admin@trisa.io", "approved").unwrap();

        let mut req =
            CertificateRequest::new(vasp.id, vasp.common_name.clone(), "CipherTrace EE".into());
        req.set_status(RequestStatus::ReadyToSubmit, AUTOMATED, "registered").unwrap();
        vasp.certificate_request_ids.push(req.id);

        (store, vault, vasp, req)
    }

    fn manager(
        store: MemoryDirectoryStore,
        vault: MemorySecretVault,
        ca: MockCertificateAuthority,
    ) -> CertificateManager {
        let config = CertManConfig {
            enabled: true,
            interval_secs: 1,
            storage: tempfile::tempdir().unwrap().keep(),
            request_timeout_secs: 1,
        };
        CertificateManager::new(
            Arc::new(store),
            Arc::new(vault),
            Arc::new(ca),
            EmailCourier::new(Arc::new(MemoryMailTransport::new())),
            &config,
        )
    }

    #[tokio::test]
    async fn test_transient_balance_error_leaves_request_unchanged() {
        let (store, vault, vasp, req) = eligible_fixture();
        store.create_vasp(&vasp).await.unwrap();
        store.create_cert_req(&req).await.unwrap();
        vault
            .add_version(&req.scope(), SECRET_PASSWORD, b"0123456789abcdef")
            .await
            .unwrap();

        let mut ca = MockCertificateAuthority::new();
        ca.expect_user_available_balance()
            .returning(|| Err(CaError::Transport("gateway timeout".into())));

        let manager = manager(store.clone(), vault, ca);
        manager.tick().await.unwrap();

        let after = store.retrieve_cert_req(&req.id).await.unwrap();
        assert_eq!(after.status, RequestStatus::ReadyToSubmit);
        // no audit entry for a no-op tick
        assert_eq!(after.audit_log.len(), req.audit_log.len());
        // the vasp still took ownership exactly once
        let vasp_after = store.retrieve_vasp(&vasp.id).await.unwrap();
        assert_eq!(
            vasp_after.verification_status,
            VerificationStatus::IssuingCertificate
        );
    }

    #[tokio::test]
    async fn test_transient_processing_error_emits_no_audit() {
        let (store, vault, mut vasp, mut req) = eligible_fixture();
        vasp.set_status(VerificationStatus::IssuingCertificate, AUTOMATED, "pickup").unwrap();
        req.batch_id = 42;
        req.set_status(RequestStatus::Processing, AUTOMATED, "submitted").unwrap();
        store.create_vasp(&vasp).await.unwrap();
        store.create_cert_req(&req).await.unwrap();

        let mut ca = MockCertificateAuthority::new();
        ca.expect_batch_processing_info()
            .returning(|_| Err(CaError::Transport("status poll 404".into())));

        let manager = manager(store.clone(), vault, ca);
        manager.tick().await.unwrap();

        let after = store.retrieve_cert_req(&req.id).await.unwrap();
        assert_eq!(after.status, RequestStatus::Processing);
        assert_eq!(after.audit_log.len(), req.audit_log.len());
    }

    #[tokio::test]
    async fn test_processing_status_change_audits_self_transition() {
        let (store, vault, mut vasp, mut req) = eligible_fixture();
        vasp.set_status(VerificationStatus::IssuingCertificate, AUTOMATED, "pickup").unwrap();
        req.batch_id = 42;
        req.batch_status = "CREATED".into();
        req.set_status(RequestStatus::Processing, AUTOMATED, "submitted").unwrap();
        store.create_vasp(&vasp).await.unwrap();
        store.create_cert_req(&req).await.unwrap();

        let mut ca = MockCertificateAuthority::new();
        ca.expect_batch_processing_info().returning(|_| {
            Ok(ca::ProcessingInfo {
                active: 1,
                success: 0,
                failed: 0,
            })
        });
        ca.expect_batch_detail().returning(|id| {
            Ok(ca::BatchDetail {
                batch_id: id,
                batch_name: "batch-42".into(),
                status: "VALIDATED".into(),
                reject_reason: None,
            })
        });

        let manager = manager(store.clone(), vault, ca);
        manager.tick().await.unwrap();

        let after = store.retrieve_cert_req(&req.id).await.unwrap();
        assert_eq!(after.status, RequestStatus::Processing);
        assert_eq!(after.batch_status, "VALIDATED");
        let last = after.audit_log.last().unwrap();
        assert_eq!(last.previous, RequestStatus::Processing);
        assert_eq!(last.current, RequestStatus::Processing);

        // the same status on the next tick is not audited again
        let audit_len = after.audit_log.len();
        manager.tick().await.unwrap();
        let again = store.retrieve_cert_req(&req.id).await.unwrap();
        assert_eq!(again.audit_log.len(), audit_len);
    }
}
