//! Secret Box: AES-256-GCM sealing for secrets at rest
//!
//! Database passwords in `tenant_connections` and government identification
//! numbers in tenant databases are stored as self-describing strings:
//!
//! ```text
//! <category prefix><base64(nonce || ciphertext || tag)>
//! ```
//!
//! The category prefix is also bound as associated data, so a value sealed as
//! a password cannot be opened as a government id and vice versa. A fresh
//! 96-bit nonce is drawn from the OS RNG on every seal.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::{Engine as _, engine::general_purpose};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

/// Built-in key used only by the `local` and `test` profiles.
///
/// Its value is public; any other profile refuses to start without
/// `SSN_ENCRYPTION_KEY`.
pub const DEVELOPMENT_KEY: [u8; 32] = *b"taxdesk-development-only-key-32b";

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("malformed ciphertext")]
    MalformedCiphertext,
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(CryptoKey(bytes))
    }

    /// Decode a base64 key as provided through `SSN_ENCRYPTION_KEY`
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid base64: {}", e)))?;
        Self::new(bytes)
    }

    /// The public development key
    pub fn development() -> Self {
        CryptoKey(DEVELOPMENT_KEY.to_vec())
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

/// Plaintext secret held in memory.
///
/// Wiped on drop and prints as `[REDACTED]`. Has no `Serialize` impl, so it
/// cannot end up in a response body.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<'de> serde::Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretString)
    }
}

/// What a sealed value holds. Each category has its own prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealCategory {
    /// Database passwords at rest
    Password,
    /// Social security / government identification numbers at rest
    GovernmentId,
}

impl SealCategory {
    pub const ALL: [SealCategory; 2] = [SealCategory::Password, SealCategory::GovernmentId];

    pub fn prefix(self) -> &'static str {
        match self {
            SealCategory::Password => "pwd:v1:",
            SealCategory::GovernmentId => "ssn:v1:",
        }
    }

    /// Category whose prefix starts `value`, if any
    pub fn detect(value: &str) -> Option<SealCategory> {
        Self::ALL
            .into_iter()
            .find(|category| value.starts_with(category.prefix()))
    }
}

/// Authenticated symmetric sealing under one process-wide key.
///
/// Constructed once during bootstrap and shared by reference; there is no
/// ambient global instance.
#[derive(Clone)]
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

impl SecretBox {
    pub fn new(key: &CryptoKey) -> Self {
        let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
        Self {
            cipher: Aes256Gcm::new(cipher_key),
        }
    }

    /// Seal `plaintext` under `category`, returning the tagged string form
    pub fn seal(&self, category: SealCategory, plaintext: &str) -> Result<String, CryptoError> {
        let sealed = encrypt_bytes(
            &self.cipher,
            category.prefix().as_bytes(),
            plaintext.as_bytes(),
        )?;

        let mut out = String::with_capacity(category.prefix().len() + sealed.len() * 4 / 3 + 4);
        out.push_str(category.prefix());
        general_purpose::STANDARD.encode_string(&sealed, &mut out);
        Ok(out)
    }

    /// Seal a database password
    pub fn seal_password(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.seal(SealCategory::Password, plaintext)
    }

    /// Open any sealed value, whichever category prefix it carries.
    ///
    /// Fails with [`CryptoError::MalformedCiphertext`] on a missing prefix,
    /// short or non-base64 body, or a tag mismatch.
    pub fn open(&self, sealed: &str) -> Result<String, CryptoError> {
        let category = SealCategory::detect(sealed).ok_or(CryptoError::MalformedCiphertext)?;
        self.open_as(category, sealed)
    }

    /// Open a value that must carry the `category` prefix
    pub fn open_as(&self, category: SealCategory, sealed: &str) -> Result<String, CryptoError> {
        let body = sealed
            .strip_prefix(category.prefix())
            .ok_or(CryptoError::MalformedCiphertext)?;

        let raw = general_purpose::STANDARD
            .decode(body)
            .map_err(|_| CryptoError::MalformedCiphertext)?;

        let plaintext = decrypt_bytes(&self.cipher, category.prefix().as_bytes(), &raw)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::MalformedCiphertext)
    }
}

/// Whether `value` carries any known sealed prefix.
///
/// Unsealed values are tolerated by callers during credential rotation.
pub fn is_sealed(value: &str) -> bool {
    SealCategory::detect(value).is_some()
}

fn encrypt_bytes(cipher: &Aes256Gcm, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

fn decrypt_bytes(cipher: &Aes256Gcm, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(CryptoError::MalformedCiphertext);
    }

    let (nonce, ciphertext_and_tag) = sealed.split_at(NONCE_LEN);

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext_and_tag,
                aad,
            },
        )
        .map_err(|_| CryptoError::MalformedCiphertext)
}
