//! Errors produced by the crypto layer.

use thiserror::Error;

use super::kdf::KEY_LEN;

/// Errors produced by the crypto layer.
///
/// Decrypting data that turns out not to be ciphertext is *not* an error;
/// see [`FieldEncryptor::decrypt`](super::FieldEncryptor::decrypt).
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The PBKDF2 primitive rejected its inputs.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The derived key could not be loaded into the cipher.
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// The OS random number generator could not produce a nonce.
    #[error("nonce generation failed: {0}")]
    Randomness(String),

    /// AES-GCM-SIV sealing or opening failed.
    #[error("aead operation failed")]
    AeadFailure,

    /// The key round-trip check did not reproduce its sample.
    #[error("key self-test failed: {0}")]
    SelfTest(&'static str),
}
