//! Ports to external collaborators
//!
//! The store, vault, certificate authority, and mail transport are all
//! external systems; the core only ever talks to them through these
//! interfaces so each can be swapped for an in-memory or mock adapter
//! under test.

pub mod ca;
pub mod mail;
pub mod store;
pub mod vault;

pub use ca::{BatchDetail, BatchInfo, CaError, CertificateAuthority, ProcessingInfo};
pub use mail::{Email, EmailAttachment, MailError, MailTransport};
pub use store::{DirectoryStore, SearchQuery, StoreError};
pub use vault::{SecretVault, VaultError};
