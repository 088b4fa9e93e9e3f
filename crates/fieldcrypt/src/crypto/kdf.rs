//! Passphrase to key derivation (PBKDF2-HMAC-SHA256).
//!
//! The salt and iteration count are fixed for the application. The same
//! passphrase must produce the same key after every restart, otherwise values
//! written before the restart could no longer be opened.

use hmac::Hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::error::CryptoError;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Application-wide salt. Changing it makes every stored ciphertext unreadable.
pub const KDF_SALT: &[u8] = b"fieldcrypt.v1.static-salt";

/// PBKDF2 rounds; at least 100,000 for HMAC-SHA256.
pub const KDF_ITERATIONS: u32 = 100_000;

/// Key bytes produced by [`KeyDeriver`].
///
/// Zeroed on drop. Only lives long enough to key the cipher.
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Deterministic, deliberately slow passphrase stretcher.
#[derive(Debug, Clone, Copy)]
pub struct KeyDeriver {
    salt: &'static [u8],
    iterations: u32,
}

impl KeyDeriver {
    /// Deriver using the application salt and iteration count.
    pub const fn new() -> Self {
        Self {
            salt: KDF_SALT,
            iterations: KDF_ITERATIONS,
        }
    }

    /// Stretch `passphrase` into a [`KEY_LEN`]-byte key.
    ///
    /// Takes hundreds of milliseconds; call once per process.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeyDerivation`] if the PBKDF2 primitive rejects
    /// its parameters. HMAC accepts keys of any length, so this is not
    /// expected in practice.
    pub fn derive(&self, passphrase: &str) -> Result<DerivedKey, CryptoError> {
        let mut key = DerivedKey([0u8; KEY_LEN]);
        pbkdf2::pbkdf2::<Hmac<Sha256>>(
            passphrase.as_bytes(),
            self.salt,
            self.iterations,
            &mut key.0,
        )
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(key)
    }
}

impl Default for KeyDeriver {
    fn default() -> Self {
        Self::new()
    }
}
