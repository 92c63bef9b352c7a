//! Concrete implementations of the external-collaborator ports
//!
//! In-memory adapters back the test suite and development wiring; the
//! file-backed store and vault let the daemon run without external
//! infrastructure; the SMTP and Sectigo adapters speak to the real
//! collaborators.

pub mod ca_mock;
pub mod file_store;
pub mod file_vault;
pub mod memory_mail;
pub mod memory_store;
pub mod memory_vault;
pub mod sectigo;
pub mod smtp;

pub use ca_mock::MockCa;
pub use file_store::FileDirectoryStore;
pub use file_vault::FileSecretVault;
pub use memory_mail::MemoryMailTransport;
pub use memory_store::MemoryDirectoryStore;
pub use memory_vault::MemorySecretVault;
pub use sectigo::SectigoClient;
pub use smtp::SmtpMailTransport;
