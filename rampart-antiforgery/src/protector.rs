//! Authenticated protection of serialized tokens.
//!
//! The engine never does cryptography itself; it hands framed token bytes to a
//! [`Protector`] and expects tampering to be detected on the way back.
//! Implementations are shared across concurrent requests and must not need
//! external locking.

use crate::error::ProtectorError;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Minimum key length accepted by [`HmacProtector`].
pub const MIN_KEY_LEN: usize = 32;

const TAG_LEN: usize = 32;
const PURPOSE: &[u8] = b"rampart.antiforgery.token.v1";

/// Authenticated encryption (or at least authentication) capability.
pub trait Protector: Send + Sync {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectorError>;

    /// Fails with [`ProtectorError::CryptographicTamper`] when the payload
    /// was not produced by [`protect`](Protector::protect) with the same key.
    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>, ProtectorError>;
}

/// HMAC-SHA256 protector.
///
/// Output is `payload || tag`. The payload stays readable; use a protector
/// backed by an AEAD when token contents must be confidential.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HmacProtector {
    key: Vec<u8>,
}

impl HmacProtector {
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, ProtectorError> {
        let key = key.into();
        if key.len() < MIN_KEY_LEN {
            return Err(ProtectorError::Failure(format!(
                "key must be at least {MIN_KEY_LEN} bytes"
            )));
        }
        Ok(Self { key })
    }

    /// Generate a random key
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; MIN_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    fn mac(&self, payload: &[u8]) -> Result<HmacSha256, ProtectorError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| ProtectorError::Failure(e.to_string()))?;
        mac.update(PURPOSE);
        mac.update(payload);
        Ok(mac)
    }
}

impl Protector for HmacProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectorError> {
        let tag = self.mac(plaintext)?.finalize().into_bytes();

        let mut protected = Vec::with_capacity(plaintext.len() + TAG_LEN);
        protected.extend_from_slice(plaintext);
        protected.extend_from_slice(&tag);
        Ok(protected)
    }

    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>, ProtectorError> {
        if protected.len() < TAG_LEN {
            return Err(ProtectorError::CryptographicTamper);
        }

        let (payload, tag) = protected.split_at(protected.len() - TAG_LEN);
        // verify_slice compares in constant time
        self.mac(payload)?
            .verify_slice(tag)
            .map_err(|_| ProtectorError::CryptographicTamper)?;

        Ok(payload.to_vec())
    }
}

impl std::fmt::Debug for HmacProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacProtector").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protector() -> HmacProtector {
        HmacProtector::new(b"test_secret_key_32_bytes_long!!!".to_vec()).unwrap()
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(HmacProtector::new(vec![1, 2, 3]).is_err());
        assert_eq!(HmacProtector::generate_key().len(), MIN_KEY_LEN);
    }

    #[test]
    fn test_protect_unprotect() {
        let protector = protector();
        let protected = protector.protect(b"payload").unwrap();
        assert_eq!(protected.len(), b"payload".len() + TAG_LEN);
        assert_eq!(protector.unprotect(&protected).unwrap(), b"payload");
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let protector = protector();
        let mut protected = protector.protect(b"payload").unwrap();
        protected[0] ^= 0x01;

        assert!(matches!(
            protector.unprotect(&protected),
            Err(ProtectorError::CryptographicTamper)
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let protected = protector().protect(b"payload").unwrap();
        let other = HmacProtector::new(HmacProtector::generate_key()).unwrap();

        assert!(matches!(
            other.unprotect(&protected),
            Err(ProtectorError::CryptographicTamper)
        ));
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(
            protector().unprotect(&[0u8; 8]),
            Err(ProtectorError::CryptographicTamper)
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        assert!(!format!("{:?}", protector()).contains("test_secret"));
    }
}
