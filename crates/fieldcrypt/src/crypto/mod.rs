//! Field encryption primitives.
//!
//! This module is free of storage dependencies. It turns a passphrase into a
//! key and exposes [`FieldEncryptor`] to every code path that persists or
//! loads a sensitive field.
//!
//! # Ciphertext format
//!
//! ```text
//! base64( nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! Values are stored in the same text columns that used to hold plaintext.
//! There is no prefix or version marker, so stored ciphertext is recognised
//! by shape alone (see [`is_ciphertext_shaped`]).

pub mod cipher;
pub mod encryptor;
pub mod error;
pub mod kdf;

pub use cipher::{is_ciphertext_shaped, MIN_ENVELOPE_LEN, NONCE_LEN, TAG_LEN};
pub use encryptor::{Classification, Decrypted, FieldEncryptor};
pub use error::CryptoError;
pub use kdf::{KeyDeriver, KEY_LEN};
