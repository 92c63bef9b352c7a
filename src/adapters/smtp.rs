//! SMTP mail transport adapter
//!
//! Sends courier messages through an SMTP relay using lettre's async
//! tokio transport. An empty relay username disables authentication and
//! STARTTLS, which is only appropriate for a local development relay.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::ports::mail::{Email, MailError, MailTransport};

/// SMTP-backed mail transport
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpMailTransport {
    /// Build a transport from the mail configuration
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let builder = if config.username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| MailError::Transport(e.to_string()))?
                .credentials(Credentials::new(
                    config.username.clone(),
                    config.password.clone(),
                ))
        };
        let mailer = builder.port(config.smtp_port).build();

        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| MailError::Message(format!("invalid sender address: {e}")))?;

        Ok(Self { mailer, sender })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| MailError::Message(format!("invalid recipient address: {e}")))?;

        let builder = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(email.subject.clone());

        let message = match &email.attachment {
            Some(attachment) => {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| MailError::Message(format!("invalid content type: {e}")))?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(email.body.clone()))
                        .singlepart(
                            Attachment::new(attachment.filename.clone())
                                .body(attachment.data.clone(), content_type),
                        ),
                )
            }
            None => builder.body(email.body.clone()),
        }
        .map_err(|e| MailError::Message(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}
