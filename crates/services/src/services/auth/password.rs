//! PBKDF2-HMAC-SHA256 password hashes, stored as
//! `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>`.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
pub const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("invalid hmac key")]
    Key,
    #[error("malformed password hash")]
    Malformed,
}

fn pbkdf2(password: &[u8], salt: &[u8], iterations: u32) -> Result<[u8; 32], PasswordError> {
    let prf = HmacSha256::new_from_slice(password).map_err(|_| PasswordError::Key)?;

    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut block = mac.finalize().into_bytes();

    let mut out = [0u8; 32];
    out.copy_from_slice(&block);
    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&block);
        block = mac.finalize().into_bytes();
        for (o, b) in out.iter_mut().zip(block.iter()) {
            *o ^= b;
        }
    }
    Ok(out)
}

pub fn hash_password(password: &str, iterations: u32) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = pbkdf2(password.as_bytes(), &salt, iterations.max(1))?;
    Ok(format!(
        "{SCHEME}${}${}${}",
        iterations.max(1),
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Checks `password` against an encoded hash in constant time.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, PasswordError> {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PasswordError::Malformed);
    };
    let iterations: u32 = iterations.parse().map_err(|_| PasswordError::Malformed)?;
    let salt = hex::decode(salt).map_err(|_| PasswordError::Malformed)?;
    let expected = hex::decode(expected).map_err(|_| PasswordError::Malformed)?;

    let actual = pbkdf2(password.as_bytes(), &salt, iterations)?;
    Ok(actual.as_slice().ct_eq(expected.as_slice()).into())
}

/// Verifies against `encoded` when there is one; otherwise runs the same derivation
/// on a fixed salt and returns `false`, so unknown accounts cost as much as wrong passwords.
pub fn check_credentials(
    password: &str,
    encoded: Option<&str>,
    iterations: u32,
) -> Result<bool, PasswordError> {
    match encoded {
        Some(encoded) => verify_password(password, encoded),
        None => {
            pbkdf2(password.as_bytes(), &[0u8; SALT_LEN], iterations.max(1))?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_right_password() {
        let encoded = hash_password("bismillah-123", 1_000).unwrap();
        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("bismillah-123", &encoded).unwrap());
        assert!(!verify_password("bismillah-124", &encoded).unwrap());
    }

    #[test]
    fn salts_differ() {
        assert_ne!(
            hash_password("same", 10).unwrap(),
            hash_password("same", 10).unwrap()
        );
    }

    #[test]
    fn matches_rfc_7914_vector() {
        // PBKDF2-HMAC-SHA256, P = "passwd", S = "salt", c = 1
        let out = pbkdf2(b"passwd", b"salt", 1).unwrap();
        assert_eq!(
            hex::encode(out),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    #[test]
    fn missing_hash_never_matches() {
        let encoded = hash_password("bismillah-123", 100).unwrap();
        assert!(check_credentials("bismillah-123", Some(&encoded), 100).unwrap());
        assert!(!check_credentials("bismillah-123", None, 100).unwrap());
        assert!(!check_credentials("", None, 0).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("x", "plain-text").is_err());
        assert!(verify_password("x", "pbkdf2-sha256$abc$00$00").is_err());
    }
}
