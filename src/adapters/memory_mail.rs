//! Recording mail transport adapter for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::ports::mail::{Email, MailError, MailTransport};

/// Mail transport that records outbound messages instead of sending them
#[derive(Clone, Default)]
pub struct MemoryMailTransport {
    sent: Arc<RwLock<Vec<Email>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryMailTransport {
    /// Create a transport with an empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages accepted so far, in send order
    pub fn sent(&self) -> Vec<Email> {
        self.sent.read().unwrap().clone()
    }

    /// Number of messages accepted so far
    pub fn sent_count(&self) -> usize {
        self.sent.read().unwrap().len()
    }

    /// Make every subsequent send fail with a transport error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl MailTransport for MemoryMailTransport {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("smtp relay unreachable".into()));
        }
        self.sent.write().unwrap().push(email.clone());
        Ok(())
    }
}
