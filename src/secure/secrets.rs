//! Symmetric encryption of small JSON payloads.
//!
//! Payloads are encrypted with AES in CFB mode using 8-bit segments and a
//! fresh random IV, and travel as a JSON envelope:
//!
//! ```text
//! {"iv": "<base64url>", "payload": "<base64url>"}
//! ```
//!
//! # Security
//!
//! The envelope is **not authenticated**. CFB has no integrity check, so a
//! modified ciphertext decrypts to different bytes instead of failing. It
//! usually fails to parse as JSON, but that is not guaranteed. Only use this
//! for values whose integrity is established some other way, for example by
//! also carrying them inside a signed token.

use crate::secure::error::{Result, SecureError};
use crate::secure::key::SecretKey;
use crate::secure::token::Payload;
use aes::{Aes128, Aes256};
use base64::Engine;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use cfb8::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// AES block size, which is also the IV length.
pub const BLOCK_SIZE: usize = 16;

/// Emits padded base64url, accepts it with or without padding.
const ENVELOPE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The wire form of an encrypted value.
///
/// Missing fields deserialize as empty strings and are rejected when the
/// envelope is decrypted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptedEnvelope {
    /// Base64url encoded IV.
    pub iv: String,
    /// Base64url encoded ciphertext.
    pub payload: String,
}

/// Encrypts and decrypts JSON values under a shared secret.
///
/// The secret is PKCS#7 padded to a multiple of 16 bytes and the padded
/// length picks the cipher: 16 bytes for AES-128, 32 for AES-256. Secrets of
/// 32 bytes or more are rejected.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use via_secure::SecureSecrets;
///
/// let secrets = SecureSecrets::new(b"a_secret")?;
///
/// let mut payload = via_secure::Payload::new();
/// payload.insert("some".to_string(), json!("data"));
///
/// let envelope = secrets.encrypt_dict(&payload)?;
/// assert_eq!(secrets.decrypt_dict(&envelope)?, payload);
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Clone)]
pub struct SecretsCodec {
    key: SecretKey,
}

/// Name under which proxy components share [`SecretsCodec`].
pub type SecureSecrets = SecretsCodec;

/// Name under which client components share [`SecretsCodec`].
pub type Encryption = SecretsCodec;

impl SecretsCodec {
    /// Creates a codec from `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidArgument`] if the padded secret is not a
    /// valid AES key length.
    pub fn new(secret: impl Into<SecretKey>) -> Result<Self> {
        let key = pkcs7_pad(secret.into().as_bytes(), BLOCK_SIZE);
        match key.len() {
            16 | 32 => Ok(Self {
                key: SecretKey::from(key),
            }),
            n => Err(SecureError::invalid_argument(format!(
                "Padded secret is {n} bytes, which is not an AES key length"
            ))),
        }
    }

    /// Encrypts `payload` and returns the JSON envelope text.
    pub fn encrypt_dict(&self, payload: &Payload) -> Result<String> {
        let envelope = self.encrypt(payload)?;
        serde_json::to_string(&envelope)
            .map_err(|e| SecureError::invalid_argument(format!("Envelope cannot be encoded: {e}")))
    }

    /// Decrypts envelope text produced by [`SecretsCodec::encrypt_dict`].
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::Decode`] if the text is not an envelope, the
    /// IV or ciphertext are not base64url, or the plaintext is not a JSON
    /// object.
    pub fn decrypt_dict(&self, envelope: &str) -> Result<Payload> {
        let envelope: EncryptedEnvelope = serde_json::from_str(envelope)
            .map_err(|e| SecureError::Decode(format!("Envelope is not valid JSON: {e}")))?;
        self.decrypt(&envelope)
    }

    /// Serializes `value` to JSON and encrypts it under a fresh IV.
    pub fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> Result<EncryptedEnvelope> {
        let mut iv = [0u8; BLOCK_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        self.encrypt_with_iv(value, &iv)
    }

    fn encrypt_with_iv<T: Serialize + ?Sized>(
        &self,
        value: &T,
        iv: &[u8; BLOCK_SIZE],
    ) -> Result<EncryptedEnvelope> {
        let mut buffer = serde_json::to_vec(value).map_err(|e| {
            SecureError::invalid_argument(format!("Value cannot be serialized: {e}"))
        })?;

        self.apply(iv, &mut buffer, Direction::Encrypt)?;

        Ok(EncryptedEnvelope {
            iv: ENVELOPE_ENGINE.encode(iv),
            payload: ENVELOPE_ENGINE.encode(&buffer),
        })
    }

    /// Decrypts `envelope` and deserializes the plaintext as `T`.
    pub fn decrypt<T: DeserializeOwned>(&self, envelope: &EncryptedEnvelope) -> Result<T> {
        let iv = ENVELOPE_ENGINE
            .decode(&envelope.iv)
            .map_err(|e| SecureError::Decode(format!("IV is not base64url: {e}")))?;
        let mut buffer = ENVELOPE_ENGINE
            .decode(&envelope.payload)
            .map_err(|e| SecureError::Decode(format!("Payload is not base64url: {e}")))?;

        self.apply(&iv, &mut buffer, Direction::Decrypt)?;

        serde_json::from_slice(&buffer).map_err(|e| {
            tracing::warn!(error = %e, "decrypted envelope is not valid JSON");
            SecureError::Decode(format!("Decrypted payload is not valid JSON: {e}"))
        })
    }

    fn apply(&self, iv: &[u8], buffer: &mut [u8], direction: Direction) -> Result<()> {
        let key = self.key.as_bytes();
        let invalid = |e: cfb8::cipher::InvalidLength| {
            SecureError::Decode(format!("IV must be {BLOCK_SIZE} bytes: {e}"))
        };

        match (key.len(), direction) {
            (16, Direction::Encrypt) => cfb8::Encryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(invalid)?
                .encrypt(buffer),
            (16, Direction::Decrypt) => cfb8::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(invalid)?
                .decrypt(buffer),
            (_, Direction::Encrypt) => cfb8::Encryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(invalid)?
                .encrypt(buffer),
            (_, Direction::Decrypt) => cfb8::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(invalid)?
                .decrypt(buffer),
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let padding = block_size - data.len() % block_size;
    let mut padded = Vec::with_capacity(data.len() + padding);
    padded.extend_from_slice(data);
    // padding is in 1..=block_size, which fits a byte
    padded.resize(data.len() + padding, padding as u8);
    padded
}

impl fmt::Debug for SecretsCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretsCodec")
            .field("key", &self.key)
            .finish()
    }
}
