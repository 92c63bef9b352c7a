//! Mail transport port
//!
//! The courier renders templates and dedupes against contact send logs;
//! the transport only moves a single finished message. Keeping the seam
//! here lets tests record outbound mail instead of speaking SMTP.

use async_trait::async_trait;
use thiserror::Error;

/// A binary attachment on an outbound message
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// One outbound message, transport-neutral
#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<EmailAttachment>,
}

/// Mail-specific errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid message: {0}")]
    Message(String),

    #[error("mail transport error: {0}")]
    Transport(String),
}

/// Port for outbound mail delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver a single message
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}
