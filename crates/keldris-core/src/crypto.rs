//! Cryptographic primitives shared across components.
//!
//! All at-rest encryption (repository credentials, webhook secrets, database
//! backup files) goes through [`encrypt`]/[`decrypt`] under the process
//! master key. API keys, password reset tokens, and email verification
//! tokens are SHA-256 hashed before storage — only the hash ever touches the
//! database.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;

/// The 32-byte process master key. Zeroized on drop; never logged or
/// serialized.
#[derive(Clone, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Build a master key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] unless `bytes` is exactly 32
    /// bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength { actual: bytes.len() });
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey").finish_non_exhaustive()
    }
}

/// Encrypt `plaintext` under `key` with AES-256-GCM, prefixing a fresh
/// 12-byte nonce to the ciphertext.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the underlying AEAD operation
/// fails (it should not, barring a misconfigured key).
pub fn encrypt(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption { reason: e.to_string() })?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.append(&mut ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext` blob produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if the input is shorter than
/// the nonce, or [`CryptoError::Decryption`] if the AEAD tag does not
/// verify (wrong key, corrupted ciphertext, or tampering).
pub fn decrypt(key: &MasterKey, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < NONCE_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: NONCE_LEN,
            actual: blob.len(),
        });
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::Decryption { reason: e.to_string() })
}

/// SHA-256 hash of `input`, hex-encoded.
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    hex::encode(Sha256::digest(input))
}

/// Constant-time comparison of two hex-encoded hash strings.
///
/// Used whenever a caller-supplied secret (API key hash, reset token hash)
/// is compared against a stored value, to avoid timing side channels.
#[must_use]
pub fn constant_time_eq_str(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `body` under `secret`, hex-encoded.
///
/// # Errors
///
/// Returns an error string if `secret` cannot be used as an HMAC key (HMAC
/// accepts keys of any length, so in practice this never fails).
pub fn hmac_sha256_hex(secret: &[u8], body: &[u8]) -> Result<String, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CryptoError::Encryption { reason: e.to_string() })?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Generate `n` cryptographically random bytes.
#[must_use]
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Zero out a `String`'s backing buffer in place (best-effort; the
/// allocator may have moved/copied the data already).
pub fn zeroize_string(s: &mut String) {
    s.zeroize();
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_encrypt_decrypt() {
        let key = MasterKey::from_bytes(&[7u8; 32]).unwrap();
        let plaintext = b"s3cr3t-repository-config";
        let blob = encrypt(&key, plaintext).unwrap();
        assert_ne!(blob[NONCE_LEN..], plaintext[..]);
        let decrypted = decrypt(&key, &blob).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_rejects_tampered_ciphertext() {
        let key = MasterKey::from_bytes(&[1u8; 32]).unwrap();
        let mut blob = encrypt(&key, b"hello").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(decrypt(&key, &blob).is_err());
    }

    #[test]
    fn master_key_requires_32_bytes() {
        assert!(MasterKey::from_bytes(&[0u8; 31]).is_err());
        assert!(MasterKey::from_bytes(&[0u8; 32]).is_ok());
    }

    #[test]
    fn hash_is_deterministic_and_sensitive_to_input() {
        assert_eq!(sha256_hex(b"abc"), sha256_hex(b"abc"));
        assert_ne!(sha256_hex(b"abc"), sha256_hex(b"abd"));
    }

    #[test]
    fn hmac_signature_matches_independent_computation() {
        let sig = hmac_sha256_hex(b"s", b"body-bytes").unwrap();
        let recomputed = hmac_sha256_hex(b"s", b"body-bytes").unwrap();
        assert!(constant_time_eq_str(&sig, &recomputed));
    }
}
