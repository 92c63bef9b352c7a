//! PKCS#12 bundle decoding
//!
//! The CA delivers issued certificates as password-protected PKCS#12
//! containers. The directory never holds the private key for longer
//! than it takes to extract the leaf X.509 metadata; the bundle itself
//! is stored opaquely in the vault.

use chrono::{DateTime, Utc};
use p12::PFX;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::prelude::*;

use crate::models::CertificateDetails;

/// Errors decoding a PKCS#12 bundle or its leaf certificate
#[derive(Debug, Error)]
pub enum Pkcs12Error {
    #[error("pkcs12 decode error: {0}")]
    Decode(String),

    #[error("no certificate in pkcs12 bundle")]
    Empty,

    #[error("x509 parse error: {0}")]
    X509(String),
}

/// Decrypt a PKCS#12 bundle and parse its leaf certificate.
///
/// The first certificate bag is the end-entity certificate; any further
/// bags are chain certificates and only the leaf is described.
pub fn parse_bundle(data: &[u8], password: &str) -> Result<CertificateDetails, Pkcs12Error> {
    let pfx = PFX::parse(data).map_err(|e| Pkcs12Error::Decode(format!("{e:?}")))?;
    if !pfx.verify_mac(password) {
        return Err(Pkcs12Error::Decode(
            "mac verification failed, wrong password or corrupted bundle".into(),
        ));
    }
    let certs = pfx
        .cert_x509_bags(password)
        .map_err(|e| Pkcs12Error::Decode(format!("{e:?}")))?;
    let leaf = certs.first().ok_or(Pkcs12Error::Empty)?;
    parse_der(leaf)
}

/// Parse a DER-encoded X.509 certificate into its details record
pub fn parse_der(der: &[u8]) -> Result<CertificateDetails, Pkcs12Error> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| Pkcs12Error::X509(e.to_string()))?;

    let not_before = to_chrono(&cert.validity().not_before)?;
    let not_after = to_chrono(&cert.validity().not_after)?;

    let mut hasher = Sha256::new();
    hasher.update(der);
    let fingerprint = hex::encode(hasher.finalize());

    Ok(CertificateDetails {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial_number: cert.raw_serial_as_string(),
        not_before,
        not_after,
        fingerprint,
    })
}

fn to_chrono(t: &ASN1Time) -> Result<DateTime<Utc>, Pkcs12Error> {
    let odt = t.to_datetime();
    DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
        .ok_or_else(|| Pkcs12Error::X509("certificate validity out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    fn test_bundle(common_name: &str, password: &str) -> Vec<u8> {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec![common_name.to_string()]).unwrap();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        let cert = params.self_signed(&key_pair).unwrap();

        let pfx = PFX::new(
            cert.der().as_ref(),
            &key_pair.serialize_der(),
            None,
            password,
            common_name,
        )
        .unwrap();
        pfx.to_der()
    }

    #[test]
    fn test_parse_bundle_extracts_leaf() {
        let bundle = test_bundle("trisa.example.com", "hunter2hunter2aa");
        let details = parse_bundle(&bundle, "hunter2hunter2aa").unwrap();
        assert!(details.subject.contains("trisa.example.com"));
        assert_eq!(details.fingerprint.len(), 64);
        assert!(details.not_after > details.not_before);
    }

    #[test]
    fn test_parse_bundle_wrong_password_fails() {
        let bundle = test_bundle("trisa.example.com", "correct-password");
        assert!(parse_bundle(&bundle, "wrong-password").is_err());
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_bundle(b"not a pkcs12 bundle", "password").is_err());
    }
}
