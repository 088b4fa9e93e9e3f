//! AES-256-GCM-SIV sealing and opening of binary envelopes.
//!
//! An envelope is `nonce (12 bytes) || ciphertext || tag (16 bytes)`. A
//! fresh random nonce is drawn for every seal. GCM-SIV degrades gracefully
//! under nonce reuse, but the design still never reuses one on purpose.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::error::CryptoError;
use super::kdf::DerivedKey;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

/// Smallest envelope that can hold a non-empty payload.
pub const MIN_ENVELOPE_LEN: usize = NONCE_LEN + 1 + TAG_LEN;

/// Keyed AEAD cipher. Immutable once built; safe to share across threads.
#[derive(Clone)]
pub struct EnvelopeCipher {
    aead: Aes256GcmSiv,
}

impl EnvelopeCipher {
    /// Build the cipher from a derived key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] if the key is rejected.
    pub fn new(key: &DerivedKey) -> Result<Self, CryptoError> {
        let bytes: &[u8] = key.as_bytes();
        let aead =
            Aes256GcmSiv::new_from_slice(bytes).map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(Self { aead })
    }

    /// Seal `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Randomness`] if the OS CSPRNG fails, or
    /// [`CryptoError::AeadFailure`] on an internal AEAD error (unreachable
    /// with a valid key and nonce).
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|e| CryptoError::Randomness(e.to_string()))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = self
            .aead
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::AeadFailure)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + sealed.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&sealed);
        Ok(envelope)
    }

    /// Open an envelope produced by [`EnvelopeCipher::seal`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::AeadFailure`] if the envelope is too short or
    /// authentication fails (wrong key or tampered data).
    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if envelope.len() < MIN_ENVELOPE_LEN {
            return Err(CryptoError::AeadFailure);
        }
        let (nonce_bytes, sealed) = envelope.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| CryptoError::AeadFailure)
    }
}

impl std::fmt::Debug for EnvelopeCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EnvelopeCipher(AES-256-GCM-SIV, [REDACTED])")
    }
}

/// Base64-encode an envelope for storage in a text column.
pub fn encode_envelope(envelope: &[u8]) -> String {
    STANDARD.encode(envelope)
}

/// Decode a stored value into an envelope if it is shaped like one.
///
/// Returns `None` for anything that is not standard padded base64 or that
/// decodes to fewer than [`MIN_ENVELOPE_LEN`] bytes.
pub fn decode_envelope(value: &str) -> Option<Vec<u8>> {
    if value.is_empty() {
        return None;
    }
    let bytes = STANDARD.decode(value).ok()?;
    (bytes.len() >= MIN_ENVELOPE_LEN).then_some(bytes)
}

/// Heuristic ciphertext test: valid base64 that decodes to at least
/// [`MIN_ENVELOPE_LEN`] bytes.
///
/// This is a shape check, not a proof. Legacy plaintext that happens to be
/// long, valid base64 is classified as ciphertext and will be skipped by the
/// migration.
pub fn is_ciphertext_shaped(value: &str) -> bool {
    decode_envelope(value).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::kdf::KeyDeriver;

    fn cipher(passphrase: &str) -> EnvelopeCipher {
        let key = KeyDeriver::new().derive(passphrase).unwrap();
        EnvelopeCipher::new(&key).unwrap()
    }

    #[test]
    fn seal_open_round_trip() {
        let c = cipher("round-trip");
        let envelope = c.seal(b"123-45-6789").unwrap();
        assert_eq!(c.open(&envelope).unwrap(), b"123-45-6789");
    }

    #[test]
    fn envelope_layout() {
        let c = cipher("layout");
        let envelope = c.seal(b"Test").unwrap();
        assert_eq!(envelope.len(), NONCE_LEN + 4 + TAG_LEN);
    }

    #[test]
    fn fresh_nonce_per_seal() {
        let c = cipher("nonce");
        let e1 = c.seal(b"same").unwrap();
        let e2 = c.seal(b"same").unwrap();
        assert_ne!(e1[..NONCE_LEN], e2[..NONCE_LEN]);
        assert_ne!(e1, e2);
    }

    #[test]
    fn wrong_key_fails_open() {
        let envelope = cipher("key-a").seal(b"secret").unwrap();
        assert!(cipher("key-b").open(&envelope).is_err());
    }

    #[test]
    fn tampered_envelope_fails_auth() {
        let c = cipher("tamper");
        let mut envelope = c.seal(b"tamper me").unwrap();
        // Flip a byte in the ciphertext to simulate tampering.
        envelope[NONCE_LEN] ^= 0xFF;
        assert!(c.open(&envelope).is_err());
    }

    #[test]
    fn short_envelope_rejected() {
        let c = cipher("short");
        assert!(c.open(&[0u8; MIN_ENVELOPE_LEN - 1]).is_err());
    }

    #[test]
    fn shape_check() {
        assert!(!is_ciphertext_shaped(""));
        assert!(!is_ciphertext_shaped("hello world"));
        // Valid base64 but only 5 bytes.
        assert!(!is_ciphertext_shaped("aGVsbG8="));
        // Exactly the minimum length.
        assert!(is_ciphertext_shaped(&encode_envelope(&[7u8; MIN_ENVELOPE_LEN])));
        assert!(!is_ciphertext_shaped(&encode_envelope(&[7u8; MIN_ENVELOPE_LEN - 1])));
    }

    #[test]
    fn debug_is_redacted() {
        assert!(format!("{:?}", cipher("debug")).contains("REDACTED"));
    }
}
