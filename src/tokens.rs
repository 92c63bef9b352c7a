//! Secure token and password generation
//!
//! Contact verification tokens, admin verification tokens, and PKCS#12
//! passwords are all minted here so the entropy and encoding rules live
//! in one place.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use secrecy::SecretString;

/// Number of random bytes in a verification token
pub const TOKEN_BYTES: usize = 48;

/// Length of a generated PKCS#12 password in ASCII characters
pub const PKCS12_PASSWORD_LENGTH: usize = 16;

/// Generate a single-use verification token.
///
/// 48 random bytes, base64 url-safe encoded so the token survives being
/// embedded in an email link.
pub fn secure_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Generate a PKCS#12 decryption password: 16 random ASCII characters.
///
/// Returned as a [`SecretString`] so the plaintext only escapes when the
/// registration reply is built; everywhere else it lives in the vault.
pub fn pkcs12_password() -> SecretString {
    let password: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PKCS12_PASSWORD_LENGTH)
        .map(char::from)
        .collect();
    SecretString::from(password)
}
