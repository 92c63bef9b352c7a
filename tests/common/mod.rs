//! Shared fixtures for the scenario tests
//!
//! Assembles the full service from in-memory adapters, the scriptable
//! mock CA, and a recording mail transport, so tests can drive the
//! registration surface and step the certificate manager tick by tick.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use gds::adapters::{MemoryDirectoryStore, MemoryMailTransport, MemorySecretVault, MockCa};
use gds::certman::CertificateManager;
use gds::config::Config;
use gds::courier::EmailCourier;
use gds::models::{
    BusinessCategory, Contact, Contacts, LegalPerson, TrixoQuestionnaire, Vasp,
};
use gds::ports::DirectoryStore;
use gds::registry::{RegisterRequest, Registry, ReviewRequest, VerifyContactRequest};

/// The assembled service plus handles on every collaborator
pub struct Harness {
    pub registry: Registry,
    pub manager: CertificateManager,
    pub store: MemoryDirectoryStore,
    pub vault: MemorySecretVault,
    pub mail: MemoryMailTransport,
    pub ca: MockCa,
    pub certs_dir: TempDir,
}

/// Build a harness over fresh in-memory state
pub fn harness() -> Harness {
    harness_with_config(Config::default())
}

/// Build a harness with a customized configuration
pub fn harness_with_config(mut config: Config) -> Harness {
    let store = MemoryDirectoryStore::new();
    let vault = MemorySecretVault::new();
    let mail = MemoryMailTransport::new();
    let ca = MockCa::new();
    let certs_dir = tempfile::tempdir().expect("tempdir");

    config.certman.storage = certs_dir.path().to_path_buf();
    config.certman.interval_secs = 1;

    let courier = EmailCourier::new(Arc::new(mail.clone()));
    let registry = Registry::new(
        Arc::new(store.clone()),
        Arc::new(vault.clone()),
        courier.clone(),
        &config,
    );
    let manager = CertificateManager::new(
        Arc::new(store.clone()),
        Arc::new(vault.clone()),
        Arc::new(ca.clone()),
        courier,
        &config.certman,
    );

    Harness {
        registry,
        manager,
        store,
        vault,
        mail,
        ca,
        certs_dir,
    }
}

/// The S1 registration: one legal contact with an email address
pub fn sample_registration() -> RegisterRequest {
    RegisterRequest {
        endpoint: "trisa.example.com:443".into(),
        common_name: String::new(),
        entity: LegalPerson {
            name: "Example VASP Ltd".into(),
            country: "US".into(),
        },
        contacts: Contacts {
            legal: Some(Contact {
                name: "Alice Legal".into(),
                email: "a@x.io".into(),
                ..Default::default()
            }),
            ..Default::default()
        },
        website: "https://trisa.example.com".into(),
        business_category: BusinessCategory::BusinessEntity,
        vasp_categories: vec!["Exchange".into()],
        established_on: "2019-04-11".into(),
        trixo: TrixoQuestionnaire {
            primary_national_jurisdiction: "US".into(),
            financial_transfers_permitted: "yes".into(),
            must_comply_travel_rule: true,
            conducts_customer_kyc: true,
        },
    }
}

/// Fetch the current VASP record
pub async fn vasp(h: &Harness, id: &Uuid) -> Vasp {
    h.store.retrieve_vasp(id).await.expect("vasp exists")
}

/// Outstanding verification token of the legal contact
pub async fn legal_token(h: &Harness, id: &Uuid) -> String {
    vasp(h, id)
        .await
        .contacts
        .legal
        .expect("legal contact")
        .verification_token
        .expect("legal contact has a token")
}

/// Register the sample VASP and verify its legal contact
pub async fn register_and_verify(h: &Harness) -> (Uuid, Uuid) {
    let reply = h
        .registry
        .register(sample_registration())
        .await
        .expect("registration succeeds");

    let token = legal_token(h, &reply.id).await;
    h.registry
        .verify_contact(VerifyContactRequest {
            id: reply.id,
            token,
        })
        .await
        .expect("contact verification succeeds");

    let record = vasp(h, &reply.id).await;
    let request_id = record.certificate_request_ids[0];
    (reply.id, request_id)
}

/// Register, verify, and approve the sample VASP
pub async fn register_and_approve(h: &Harness) -> (Uuid, Uuid) {
    let (vasp_id, request_id) = register_and_verify(h).await;

    let token = vasp(h, &vasp_id)
        .await
        .admin_verification_token
        .expect("admin token minted");
    h.registry
        .review(ReviewRequest {
            vasp_id,
            admin_verification_token: token,
            approve: true,
            reject_reason: None,
            actor: "admin@trisa.io".into(),
        })
        .await
        .expect("review approval succeeds");

    (vasp_id, request_id)
}
