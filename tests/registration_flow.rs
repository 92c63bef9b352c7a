//! Registration surface scenarios
//!
//! Covers the happy-path registration (S1 up to the review decision),
//! malformed common names (S5), duplicate contact verification (S6),
//! and the password/audit invariants of the registration reply.

mod common;

use common::*;

use gds::courier::REASON_REVIEW_REQUEST;
use gds::models::VerificationStatus;
use gds::ports::vault::{SECRET_PASSWORD, SecretVault};
use gds::registry::{
    LookupRequest, RegisterRequest, ReviewRequest, SearchRequest, ServiceStatus,
    VerifyContactRequest,
};
use gds::Error;

#[tokio::test]
async fn test_register_returns_password_exactly_once() {
    let h = harness();
    let reply = h.registry.register(sample_registration()).await.unwrap();

    assert_eq!(reply.status, VerificationStatus::Submitted);
    assert_eq!(reply.common_name, "trisa.example.com");
    assert_eq!(reply.pkcs12password.len(), 16);

    // the vault holds the same 16 bytes the reply disclosed
    let record = vasp(&h, &reply.id).await;
    assert_eq!(record.certificate_request_ids.len(), 1);
    let scope = record.certificate_request_ids[0].to_string();
    let stored = h.vault.latest_version(&scope, SECRET_PASSWORD).await.unwrap();
    assert_eq!(stored.len(), 16);
    assert_eq!(stored, reply.pkcs12password.as_bytes());
}

#[tokio::test]
async fn test_register_assigns_tokens_and_sends_verification_mail() {
    let h = harness();
    let reply = h.registry.register(sample_registration()).await.unwrap();

    let record = vasp(&h, &reply.id).await;
    let legal = record.contacts.legal.as_ref().unwrap();
    assert!(legal.verification_token.is_some());
    assert!(!legal.is_verified());

    // one verification mail to the single contact, logged on the record
    assert_eq!(h.mail.sent_count(), 1);
    assert_eq!(h.mail.sent()[0].to, "a@x.io");
    assert_eq!(legal.email_log.len(), 1);

    // the audit log opens with NO_VERIFICATION -> SUBMITTED
    assert_eq!(record.audit_log.len(), 1);
    assert_eq!(record.audit_log[0].previous, VerificationStatus::NoVerification);
    assert_eq!(record.audit_log[0].current, VerificationStatus::Submitted);
}

#[tokio::test]
async fn test_register_wildcard_common_name_writes_nothing() {
    let h = harness();
    let request = RegisterRequest {
        common_name: "*.example.com".into(),
        ..sample_registration()
    };

    let err = h.registry.register(request).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(h.store.vasp_count(), 0);
    assert_eq!(h.mail.sent_count(), 0);
}

#[tokio::test]
async fn test_register_requires_contact_email() {
    let h = harness();
    let request = RegisterRequest {
        contacts: Default::default(),
        ..sample_registration()
    };

    let err = h.registry.register(request).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert_eq!(h.store.vasp_count(), 0);
}

#[tokio::test]
async fn test_register_duplicate_common_name_conflicts() {
    let h = harness();
    h.registry.register(sample_registration()).await.unwrap();

    let err = h.registry.register(sample_registration()).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[tokio::test]
async fn test_verify_contact_moves_to_pending_review() {
    let h = harness();
    let reply = h.registry.register(sample_registration()).await.unwrap();
    let token = legal_token(&h, &reply.id).await;

    let verified = h
        .registry
        .verify_contact(VerifyContactRequest {
            id: reply.id,
            token,
        })
        .await
        .unwrap();
    assert_eq!(verified.status, VerificationStatus::PendingReview);
    assert_eq!(verified.message, "email successfully verified");

    let record = vasp(&h, &reply.id).await;
    assert!(record.admin_verification_token.is_some());
    // SUBMITTED -> EMAIL_VERIFIED -> PENDING_REVIEW on top of registration
    assert_eq!(record.audit_log.len(), 3);
    assert_eq!(record.audit_log[1].source, "a@x.io");
}

#[tokio::test]
async fn test_duplicate_verify_is_not_found_and_sends_one_review_mail() {
    let h = harness();
    let reply = h.registry.register(sample_registration()).await.unwrap();
    let token = legal_token(&h, &reply.id).await;

    h.registry
        .verify_contact(VerifyContactRequest {
            id: reply.id,
            token: token.clone(),
        })
        .await
        .unwrap();
    let before = vasp(&h, &reply.id).await;

    // replaying the token finds nothing: tokens are single use
    let err = h
        .registry
        .verify_contact(VerifyContactRequest {
            id: reply.id,
            token,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // state and send log are untouched by the replay
    let after = vasp(&h, &reply.id).await;
    assert_eq!(after.verification_status, before.verification_status);
    assert_eq!(
        after.contacts.legal.as_ref().unwrap().email_log.len(),
        before.contacts.legal.as_ref().unwrap().email_log.len()
    );

    // exactly one admin review mail went out
    let review_mails = after
        .contacts
        .legal
        .as_ref()
        .unwrap()
        .email_log
        .iter()
        .filter(|entry| entry.reason == REASON_REVIEW_REQUEST)
        .count();
    assert_eq!(review_mails, 1);
}

#[tokio::test]
async fn test_review_approval_requires_valid_token() {
    let h = harness();
    let (vasp_id, _) = register_and_verify(&h).await;

    let err = h
        .registry
        .review(ReviewRequest {
            vasp_id,
            admin_verification_token: "bogus".into(),
            approve: true,
            reject_reason: None,
            actor: "admin@trisa.io".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));

    let record = vasp(&h, &vasp_id).await;
    assert_eq!(record.verification_status, VerificationStatus::PendingReview);
}

#[tokio::test]
async fn test_review_rejection_is_terminal() {
    let h = harness();
    let (vasp_id, _) = register_and_verify(&h).await;
    let token = vasp(&h, &vasp_id).await.admin_verification_token.unwrap();

    let reply = h
        .registry
        .review(ReviewRequest {
            vasp_id,
            admin_verification_token: token,
            approve: false,
            reject_reason: Some("incomplete TRIXO questionnaire".into()),
            actor: "admin@trisa.io".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply.status, VerificationStatus::Rejected);

    let record = vasp(&h, &vasp_id).await;
    let last = record.audit_log.last().unwrap();
    assert_eq!(last.source, "admin@trisa.io");
    assert_eq!(last.reason, "incomplete TRIXO questionnaire");
}

#[tokio::test]
async fn test_lookup_search_and_verification_reads() {
    let h = harness();
    let reply = h.registry.register(sample_registration()).await.unwrap();

    let looked_up = h
        .registry
        .lookup(LookupRequest {
            common_name: Some("trisa.example.com".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(looked_up.id, reply.id);
    assert_eq!(looked_up.country, "US");
    assert!(looked_up.identity_certificate.is_none());

    let search = h
        .registry
        .search(SearchRequest {
            country: vec!["US".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(search.results.len(), 1);

    let verification = h
        .registry
        .verification(LookupRequest {
            id: Some(reply.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        verification.verification_status,
        VerificationStatus::Submitted
    );
    assert!(verification.verified_on.is_none());

    let missing = h
        .registry
        .lookup(LookupRequest {
            common_name: Some("missing.example.com".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(missing, Error::NotFound(_)));
}

#[tokio::test]
async fn test_maintenance_mode_rejects_mutations() {
    let mut config = gds::config::Config::default();
    config.maintenance = true;
    let h = harness_with_config(config);

    let state = h.registry.status(Default::default());
    assert_eq!(state.status, ServiceStatus::Maintenance);

    let err = h.registry.register(sample_registration()).await.unwrap_err();
    assert!(matches!(err, Error::Aborted(_)));
}

#[tokio::test]
async fn test_status_probe_window() {
    let h = harness();
    let state = h.registry.status(Default::default());
    assert_eq!(state.status, ServiceStatus::Healthy);

    let window = state.not_after - state.not_before;
    assert!(state.not_before > chrono::Utc::now());
    assert_eq!(window.num_minutes(), 30);
}
