//! [`FieldEncryptor`]: passphrase-gated encryption of sensitive text fields.
//!
//! The gate is part of the type. [`FieldEncryptor::Disabled`] carries no
//! cipher at all, so a disabled encryptor cannot reach cipher code. Every
//! operation on it is the identity.

use tracing::{info, trace, warn};

use super::cipher::{decode_envelope, encode_envelope, is_ciphertext_shaped, EnvelopeCipher};
use super::error::CryptoError;
use super::kdf::KeyDeriver;

/// Fixed string round-tripped by [`FieldEncryptor::validate_key`].
const SELF_TEST_SAMPLE: &str = "fieldcrypt key self-test";

/// How [`FieldEncryptor::inspect`] interpreted a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Encryption disabled, or the value was empty.
    Passthrough,
    /// Not shaped like ciphertext; treated as legacy plaintext.
    Legacy,
    /// Shaped like ciphertext but failed authentication. Wrong key or
    /// corruption; the stored value is returned unchanged.
    AuthFailed,
    /// Opened successfully.
    Decrypted,
}

/// Result of reading a stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    /// Text handed back to the caller.
    pub text: String,
    /// How the stored value was interpreted.
    pub classification: Classification,
}

impl Decrypted {
    fn unchanged(value: &str, classification: Classification) -> Self {
        Self {
            text: value.to_owned(),
            classification,
        }
    }

    /// Consume and return the text.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Encryptor holding a keyed cipher.
#[derive(Debug)]
pub struct ActiveEncryptor {
    cipher: EnvelopeCipher,
}

impl ActiveEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let envelope = self.cipher.seal(plaintext.as_bytes())?;
        Ok(encode_envelope(&envelope))
    }

    fn inspect(&self, value: &str) -> Decrypted {
        let Some(envelope) = decode_envelope(value) else {
            trace!(len = value.len(), "value is not ciphertext-shaped; treating as legacy");
            return Decrypted::unchanged(value, Classification::Legacy);
        };

        match self.cipher.open(&envelope).map(String::from_utf8) {
            Ok(Ok(text)) => Decrypted {
                text,
                classification: Classification::Decrypted,
            },
            Ok(Err(_)) | Err(_) => {
                warn!(
                    len = value.len(),
                    "ciphertext-shaped value failed authentication; wrong key or corrupted data"
                );
                Decrypted::unchanged(value, Classification::AuthFailed)
            }
        }
    }

    fn self_test(&self) -> Result<(), CryptoError> {
        let sealed = self.encrypt(SELF_TEST_SAMPLE)?;
        let envelope = decode_envelope(&sealed)
            .ok_or(CryptoError::SelfTest("output is not ciphertext-shaped"))?;
        let opened = self.cipher.open(&envelope)?;
        if opened != SELF_TEST_SAMPLE.as_bytes() {
            return Err(CryptoError::SelfTest("round trip did not reproduce the sample"));
        }
        Ok(())
    }
}

/// Encrypts sensitive fields before they are persisted and decrypts them after
/// they are loaded.
///
/// Built once per process. `Send + Sync`; share it by reference or `Arc`.
#[derive(Debug)]
pub enum FieldEncryptor {
    /// A passphrase was supplied.
    Enabled(ActiveEncryptor),
    /// No passphrase; all operations pass values through.
    Disabled,
}

impl FieldEncryptor {
    /// Build an encryptor from the operator passphrase.
    ///
    /// An empty passphrase yields [`FieldEncryptor::Disabled`]. Otherwise the
    /// key is derived (slow, see [`KeyDeriver`]) and the cipher is built.
    ///
    /// # Errors
    ///
    /// Returns a [`CryptoError`] if derivation or cipher construction fails.
    /// Callers must treat this as fatal.
    pub fn new(passphrase: &str) -> Result<Self, CryptoError> {
        if passphrase.is_empty() {
            info!("field encryption disabled: no passphrase configured");
            return Ok(Self::Disabled);
        }
        let key = KeyDeriver::new().derive(passphrase)?;
        let cipher = EnvelopeCipher::new(&key)?;
        info!(
            algorithm = "AES-256-GCM-SIV",
            kdf = "PBKDF2-HMAC-SHA256",
            "field encryption enabled"
        );
        Ok(Self::Enabled(ActiveEncryptor { cipher }))
    }

    /// Returns `true` if a passphrase was configured.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Encrypt a value for storage.
    ///
    /// Disabled encryptors and empty strings return the input unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Randomness`] if no nonce can be drawn. This
    /// indicates a broken platform entropy source.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        match self {
            Self::Enabled(active) if !plaintext.is_empty() => active.encrypt(plaintext),
            _ => Ok(plaintext.to_owned()),
        }
    }

    /// Decrypt a stored value.
    ///
    /// Never fails. Values that are not ciphertext-shaped, or that fail
    /// authentication, are returned unchanged as legacy plaintext. Use
    /// [`FieldEncryptor::inspect`] to tell those cases apart.
    pub fn decrypt(&self, value: &str) -> String {
        self.inspect(value).into_text()
    }

    /// Decrypt a stored value and report how it was interpreted.
    pub fn inspect(&self, value: &str) -> Decrypted {
        match self {
            Self::Enabled(active) if !value.is_empty() => active.inspect(value),
            _ => Decrypted::unchanged(value, Classification::Passthrough),
        }
    }

    /// [`FieldEncryptor::encrypt`] for nullable columns.
    ///
    /// # Errors
    ///
    /// Same as [`FieldEncryptor::encrypt`].
    pub fn encrypt_nullable(&self, plaintext: Option<&str>) -> Result<Option<String>, CryptoError> {
        plaintext.map(|p| self.encrypt(p)).transpose()
    }

    /// [`FieldEncryptor::decrypt`] for nullable columns.
    pub fn decrypt_nullable(&self, value: Option<&str>) -> Option<String> {
        value.map(|v| self.decrypt(v))
    }

    /// Heuristic: is `value` shaped like ciphertext?
    ///
    /// Needs no key, so it answers the same on a disabled encryptor.
    pub fn is_encrypted(&self, value: &str) -> bool {
        is_ciphertext_shaped(value)
    }

    /// Round-trip a fixed sample through the cipher.
    ///
    /// Unlike [`FieldEncryptor::decrypt`], authentication failure here is an
    /// error. A disabled encryptor has nothing to check and succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SelfTest`] or the underlying cipher error.
    pub fn validate_key(&self) -> Result<(), CryptoError> {
        match self {
            Self::Enabled(active) => active.self_test(),
            Self::Disabled => Ok(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn shared_test_encryptor() -> &'static FieldEncryptor {
    use std::sync::OnceLock;
    static ENCRYPTOR: OnceLock<FieldEncryptor> = OnceLock::new();
    ENCRYPTOR.get_or_init(|| FieldEncryptor::new("correct-horse").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::cipher::{MIN_ENVELOPE_LEN, NONCE_LEN, TAG_LEN};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::collections::HashSet;

    fn enabled() -> &'static FieldEncryptor {
        shared_test_encryptor()
    }

    #[test]
    fn round_trip() {
        let enc = enabled();
        let long = "x".repeat(4096);
        for p in ["a", "hello world", "ünïcødé ✓", "123-45-6789", long.as_str()] {
            let c = enc.encrypt(p).unwrap();
            assert_ne!(c, p);
            assert_eq!(enc.decrypt(&c), p);
        }
    }

    #[test]
    fn disabled_passes_everything_through() {
        let enc = FieldEncryptor::new("").unwrap();
        assert!(!enc.is_enabled());
        for p in ["", "hello world", "aGVsbG8gd29ybGQgaGVsbG8gd29ybGQgaGVsbG8="] {
            assert_eq!(enc.encrypt(p).unwrap(), p);
            assert_eq!(enc.decrypt(p), p);
        }
        assert!(enc.validate_key().is_ok());
    }

    #[test]
    fn empty_and_null_pass_through() {
        let enc = enabled();
        assert_eq!(enc.encrypt("").unwrap(), "");
        assert_eq!(enc.decrypt(""), "");
        assert_eq!(enc.encrypt_nullable(None).unwrap(), None);
        assert_eq!(enc.decrypt_nullable(None), None);
        assert_eq!(enc.inspect("").classification, Classification::Passthrough);
    }

    #[test]
    fn nullable_delegates_to_scalar() {
        let enc = enabled();
        let c = enc.encrypt_nullable(Some("555-0100")).unwrap().unwrap();
        assert!(enc.is_encrypted(&c));
        assert_eq!(enc.decrypt_nullable(Some(&c)).as_deref(), Some("555-0100"));
        assert_eq!(enc.encrypt_nullable(Some("")).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn same_plaintext_different_ciphertext() {
        let enc = enabled();
        let c1 = enc.encrypt("repeat").unwrap();
        let c2 = enc.encrypt("repeat").unwrap();
        assert_ne!(c1, c2);
        assert_eq!(enc.decrypt(&c1), "repeat");
        assert_eq!(enc.decrypt(&c2), "repeat");
    }

    #[test]
    fn legacy_plaintext_tolerated() {
        let enc = enabled();
        let d = enc.inspect("plain old text");
        assert_eq!(d.text, "plain old text");
        assert_eq!(d.classification, Classification::Legacy);
        // Valid base64, too short to be an envelope.
        assert_eq!(enc.decrypt("aGVsbG8="), "aGVsbG8=");
    }

    #[test]
    fn heuristic_classification() {
        let enc = enabled();
        assert!(enc.is_encrypted(&enc.encrypt("hello world").unwrap()));
        assert!(!enc.is_encrypted("hello world"));
        assert!(!enc.is_encrypted(""));
    }

    #[test]
    fn heuristic_false_positive_is_documented_behaviour() {
        // Long, valid base64 plaintext is indistinguishable by shape.
        let legacy = STANDARD.encode([0x41u8; MIN_ENVELOPE_LEN]);
        let enc = enabled();
        assert!(enc.is_encrypted(&legacy));
        let d = enc.inspect(&legacy);
        assert_eq!(d.text, legacy);
        assert_eq!(d.classification, Classification::AuthFailed);
    }

    #[test]
    fn concrete_scenario() {
        let enc = enabled();
        let plaintext = "meet me at dawn";
        let c = enc.encrypt(plaintext).unwrap();

        let raw = STANDARD.decode(&c).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + plaintext.len() + TAG_LEN);
        assert_eq!(raw.len(), 43);
        assert_eq!(c.len(), 60);

        assert_eq!(enc.decrypt(&c), plaintext);
        assert_eq!(enc.decrypt(plaintext), plaintext);
    }

    #[test]
    fn wrong_key_returns_ciphertext_unchanged() {
        let a = enabled();
        let b = FieldEncryptor::new("battery-staple").unwrap();
        let c = a.encrypt("meet me at dawn").unwrap();

        let d = b.inspect(&c);
        assert_eq!(d.text, c);
        assert_ne!(d.text, "meet me at dawn");
        assert_eq!(d.classification, Classification::AuthFailed);
        assert_eq!(b.decrypt(&c), c);
    }

    #[test]
    fn restart_with_same_passphrase_decrypts() {
        let c = enabled().encrypt("survives restart").unwrap();
        let restarted = FieldEncryptor::new("correct-horse").unwrap();
        assert_eq!(restarted.inspect(&c).classification, Classification::Decrypted);
        assert_eq!(restarted.decrypt(&c), "survives restart");
    }

    #[test]
    fn validate_key_succeeds_for_working_cipher() {
        assert!(enabled().validate_key().is_ok());
    }

    #[test]
    fn concurrent_use_without_locking() {
        let enc = enabled();
        let ciphertexts: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    s.spawn(move || {
                        (0..32)
                            .map(|i| {
                                let p = format!("thread {t} value {i}");
                                let c = enc.encrypt(&p).unwrap();
                                assert_eq!(enc.decrypt(&c), p);
                                c
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        let unique: HashSet<_> = ciphertexts.iter().collect();
        assert_eq!(unique.len(), ciphertexts.len());
    }

    #[test]
    fn encryptor_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FieldEncryptor>();
    }
}
