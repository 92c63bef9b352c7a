//! Email courier
//!
//! Renders notification templates and delivers them through the mail
//! transport, keeping a per-contact send log on the VASP record. The
//! log doubles as the dedupe record: a message with the same (reason,
//! reference) already logged on a contact is never sent again. Callers
//! persist the mutated VASP after a call that reports sends.
//!
//! Contacts are visited in a fixed order: legal, administrative,
//! technical, billing.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::{Contact, EmailLogEntry, Vasp};
use crate::ports::mail::{Email, EmailAttachment, MailTransport};

/// Send-log reason for contact verification mail
pub const REASON_VERIFY_CONTACT: &str = "verify_contact";

/// Send-log reason for the administrative review request
pub const REASON_REVIEW_REQUEST: &str = "review_request";

/// Send-log reason for certificate delivery
pub const REASON_DELIVER_CERTS: &str = "deliver_certs";

/// Send-log reason for registration rejection
pub const REASON_REJECTION: &str = "rejection";

/// Templated outbound email over a pluggable transport
#[derive(Clone)]
pub struct EmailCourier {
    transport: Arc<dyn MailTransport>,
}

impl EmailCourier {
    /// Create a courier over the given transport
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        EmailCourier { transport }
    }

    /// Send verification mail to every unverified contact that has an
    /// email address and an outstanding token. Returns the number of
    /// messages delivered to the transport.
    pub async fn send_verify_contacts(&self, vasp: &mut Vasp) -> usize {
        let vasp_id = vasp.id;
        let common_name = vasp.common_name.clone();
        let mut sent = 0;
        for (kind, contact) in vasp.contacts.iter_ordered_mut() {
            if contact.email.is_empty() {
                continue;
            }
            let Some(token) = contact.verification_token.clone() else {
                continue;
            };
            let subject = "TRISA: please verify your email address".to_string();
            let body = format!(
                "Hello {name},\n\n\
                 You have been listed as the {kind} contact of {common_name} in its\n\
                 TRISA Global Directory Service registration. To verify your email\n\
                 address, submit the following token with the VerifyContact API:\n\n\
                 VASP ID: {vasp_id}\n\
                 Token:   {token}\n\n\
                 If you did not expect this registration you can ignore this message.\n",
                name = contact.name,
                kind = kind.as_str(),
            );
            if self
                .deliver(contact, REASON_VERIFY_CONTACT, subject, body, Some(token), None)
                .await
            {
                sent += 1;
            }
        }
        sent
    }

    /// Request administrative review of a verified registration. Sent at
    /// most once per VASP over its lifetime, to verified contacts.
    pub async fn send_review_request(&self, vasp: &mut Vasp) -> usize {
        // lifetime dedupe spans every contact, not just the recipient
        let already_sent = vasp.contacts.iter_ordered().any(|(_, c)| {
            c.email_log
                .iter()
                .any(|entry| entry.reason == REASON_REVIEW_REQUEST)
        });
        if already_sent {
            return 0;
        }

        let common_name = vasp.common_name.clone();
        let vasp_id = vasp.id;
        let token = vasp.admin_verification_token.clone().unwrap_or_default();
        let mut sent = 0;
        for (_, contact) in vasp.contacts.iter_ordered_mut() {
            if !contact.is_verified() || contact.email.is_empty() {
                continue;
            }
            let subject = format!("TRISA: registration review requested for {common_name}");
            let body = format!(
                "A new TRISA Global Directory Service registration is ready for\n\
                 administrative review.\n\n\
                 VASP ID:                  {vasp_id}\n\
                 Common name:              {common_name}\n\
                 Admin verification token: {token}\n\n\
                 An administrator must approve or reject this registration before\n\
                 certificate issuance can begin.\n",
            );
            if self
                .deliver(contact, REASON_REVIEW_REQUEST, subject, body, None, None)
                .await
            {
                sent += 1;
            }
        }
        sent
    }

    /// Deliver the issued PKCS#12 bundle to verified contacts. Sent at
    /// most once per certificate request per contact.
    pub async fn send_deliver_certs(
        &self,
        vasp: &mut Vasp,
        request_id: &Uuid,
        pkcs12: &[u8],
    ) -> usize {
        let common_name = vasp.common_name.clone();
        let reference = request_id.to_string();
        let mut sent = 0;
        for (_, contact) in vasp.contacts.iter_ordered_mut() {
            if !contact.is_verified() || contact.email.is_empty() {
                continue;
            }
            let subject = format!("TRISA: identity certificate issued for {common_name}");
            let body = format!(
                "Congratulations, the TRISA identity certificate for {common_name}\n\
                 has been issued. The attached PKCS#12 bundle is encrypted with the\n\
                 password returned when the registration was submitted; that password\n\
                 was shown exactly once and is not recoverable from the directory.\n",
            );
            let attachment = EmailAttachment {
                filename: format!("{common_name}.p12"),
                content_type: "application/x-pkcs12".to_string(),
                data: pkcs12.to_vec(),
            };
            if self
                .deliver(
                    contact,
                    REASON_DELIVER_CERTS,
                    subject,
                    body,
                    Some(reference.clone()),
                    Some(attachment),
                )
                .await
            {
                sent += 1;
            }
        }
        sent
    }

    /// Notify verified contacts that the registration or certificate
    /// request was rejected. Sent at most once per certificate request
    /// per contact.
    pub async fn send_rejection(&self, vasp: &mut Vasp, reason: &str, request_id: &Uuid) -> usize {
        let common_name = vasp.common_name.clone();
        let reference = request_id.to_string();
        let mut sent = 0;
        for (_, contact) in vasp.contacts.iter_ordered_mut() {
            if !contact.is_verified() || contact.email.is_empty() {
                continue;
            }
            let subject = format!("TRISA: registration rejected for {common_name}");
            let body = format!(
                "The TRISA Global Directory Service could not complete certificate\n\
                 issuance for {common_name}.\n\n\
                 Reason: {reason}\n\n\
                 Contact the directory administrators to amend and resubmit the\n\
                 registration.\n",
            );
            if self
                .deliver(
                    contact,
                    REASON_REJECTION,
                    subject,
                    body,
                    Some(reference.clone()),
                    None,
                )
                .await
            {
                sent += 1;
            }
        }
        sent
    }

    /// Dedupe, send, and log one message to one contact. Returns true
    /// when the transport accepted the message.
    async fn deliver(
        &self,
        contact: &mut Contact,
        reason: &str,
        subject: String,
        body: String,
        reference: Option<String>,
        attachment: Option<EmailAttachment>,
    ) -> bool {
        let duplicate = contact
            .email_log
            .iter()
            .any(|entry| entry.reason == reason && entry.reference == reference);
        if duplicate {
            info!(recipient = %contact.email, reason, "suppressing duplicate email");
            return false;
        }

        let email = Email {
            to: contact.email.clone(),
            subject: subject.clone(),
            body,
            attachment,
        };
        match self.transport.send(&email).await {
            Ok(()) => {
                contact.email_log.push(EmailLogEntry {
                    timestamp: Utc::now(),
                    reason: reason.to_string(),
                    subject,
                    recipient: contact.email.clone(),
                    reference,
                });
                true
            }
            Err(e) => {
                // never fatal: the token stays intact so an operator can resend
                error!(recipient = %contact.email, reason, error = %e, "failed to send email");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryMailTransport;
    use crate::models::{Contacts, LegalPerson};

    fn contact(email: &str, verified: bool) -> Contact {
        Contact {
            name: "Jane Doe".into(),
            email: email.into(),
            verification_token: if verified { None } else { Some(format!("token-{email}")) },
            verified,
            ..Default::default()
        }
    }

    fn sample_vasp() -> Vasp {
        Vasp::new(
            "trisa.directory".into(),
            "trisa.example.com".into(),
            "trisa.example.com:443".into(),
            LegalPerson {
                name: "Example VASP Ltd".into(),
                country: "US".into(),
            },
            Contacts {
                legal: Some(contact("legal@example.com", false)),
                technical: Some(contact("tech@example.com", false)),
                ..Default::default()
            },
        )
    }

    fn courier() -> (EmailCourier, MemoryMailTransport) {
        let transport = MemoryMailTransport::new();
        (EmailCourier::new(Arc::new(transport.clone())), transport)
    }

    #[tokio::test]
    async fn test_verify_contacts_sends_once_per_token() {
        let (courier, outbox) = courier();
        let mut vasp = sample_vasp();

        assert_eq!(courier.send_verify_contacts(&mut vasp).await, 2);
        assert_eq!(outbox.sent_count(), 2);
        // legal is visited before technical
        assert_eq!(outbox.sent()[0].to, "legal@example.com");

        // replays are suppressed by the send log
        assert_eq!(courier.send_verify_contacts(&mut vasp).await, 0);
        assert_eq!(outbox.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_review_request_once_per_vasp() {
        let (courier, outbox) = courier();
        let mut vasp = sample_vasp();
        vasp.contacts.legal = Some(contact("legal@example.com", true));
        vasp.admin_verification_token = Some("admin-token".into());

        assert_eq!(courier.send_review_request(&mut vasp).await, 1);
        assert!(outbox.sent()[0].body.contains("admin-token"));

        // verifying a second contact later must not trigger another review mail
        vasp.contacts.technical = Some(contact("tech@example.com", true));
        assert_eq!(courier.send_review_request(&mut vasp).await, 0);
        assert_eq!(outbox.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_deliver_certs_attaches_bundle_once_per_request() {
        let (courier, outbox) = courier();
        let mut vasp = sample_vasp();
        vasp.contacts.legal = Some(contact("legal@example.com", true));
        let request_id = Uuid::new_v4();

        assert_eq!(
            courier.send_deliver_certs(&mut vasp, &request_id, b"bundle").await,
            1
        );
        let mail = &outbox.sent()[0];
        let attachment = mail.attachment.as_ref().unwrap();
        assert_eq!(attachment.filename, "trisa.example.com.p12");
        assert_eq!(attachment.data, b"bundle");

        assert_eq!(
            courier.send_deliver_certs(&mut vasp, &request_id, b"bundle").await,
            0
        );

        // a fresh request is a fresh delivery
        let other_request = Uuid::new_v4();
        assert_eq!(
            courier.send_deliver_certs(&mut vasp, &other_request, b"bundle").await,
            1
        );
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_log_empty() {
        let (courier, outbox) = courier();
        outbox.set_failing(true);
        let mut vasp = sample_vasp();

        assert_eq!(courier.send_verify_contacts(&mut vasp).await, 0);
        let legal = vasp.contacts.legal.as_ref().unwrap();
        assert!(legal.email_log.is_empty());
        // token intact so an operator can resend
        assert!(legal.verification_token.is_some());

        outbox.set_failing(false);
        assert_eq!(courier.send_verify_contacts(&mut vasp).await, 2);
    }
}
