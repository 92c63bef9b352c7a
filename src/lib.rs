//! # GDS - TRISA Global Directory Service
//!
//! An authoritative registry of Virtual Asset Service Providers (VASPs)
//! that issue and hold X.509 identity certificates for peer-to-peer
//! compliance messaging. The crate owns the end-to-end workflow that
//! takes a VASP from self-submitted registration to holding a signed
//! certificate:
//!
//! - **Registration API** ([`registry`]): accepts registrations, drives
//!   the VASP verification state machine through contact email
//!   verification and administrative review, and stages a certificate
//!   request for issuance.
//! - **Certificate manager** ([`certman`]): a single serialized
//!   background worker that submits staged requests to the external
//!   certificate authority, polls batches, downloads the PKCS#12
//!   bundle, and records the issued certificate.
//! - **Ports** ([`ports`]): seams to the external collaborators - the
//!   directory store, the secret vault, the CA batch API, and the mail
//!   transport - with in-memory, file-backed, and network adapters
//!   under [`adapters`].

pub mod adapters;
pub mod certman;
pub mod config;
pub mod courier;
pub mod error;
pub mod models;
pub mod pkcs12;
pub mod ports;
pub mod registry;
pub mod server;
pub mod tokens;

// Re-export commonly used types
pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::certman::CertificateManager;
    pub use crate::config::Config;
    pub use crate::courier::EmailCourier;
    pub use crate::error::{Error, Result};
    pub use crate::models::{
        Certificate, CertificateRequest, RequestStatus, Vasp, VerificationStatus,
    };
    pub use crate::ports::{CertificateAuthority, DirectoryStore, MailTransport, SecretVault};
    pub use crate::registry::Registry;
}
