//! Signed nonces bound to an expiry.
//!
//! A nonce has the shape `{exp}.{salt}.{signature}` where the signature is an
//! HMAC-SHA256 over the raw `exp` text and the salt. The MAC
//! covers the exact text that travels, and the unpadded base64 signature is
//! decoded strictly, so changing any single character makes verification
//! fail.

use crate::secure::error::{Result, SecureError};
use crate::secure::expiry::{Expires, ExpiryPolicy};
use crate::secure::key::SecretKey;
use crate::secure::time_utils::{TimeProviderFn, unix_seconds};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// A function that generates the random part of a nonce.
pub type SaltGeneratorFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Shared contract of the nonce generators.
pub trait SecureNonce {
    /// Creates a nonce that stops verifying at `expires`.
    fn create(&self, expires: impl Into<Expires>) -> Result<String>;

    /// Checks that `nonce` was created under this secret and has not expired.
    ///
    /// # Errors
    ///
    /// - [`SecureError::MissingToken`] if `nonce` is empty
    /// - [`SecureError::InvalidToken`] if it is malformed, forged, or expired
    fn verify(&self, nonce: &str) -> Result<()>;
}

/// The MAC shared by both nonce kinds.
#[derive(Clone)]
struct NonceMac {
    secret: SecretKey,
    expiry: ExpiryPolicy,
}

impl NonceMac {
    fn new(secret: SecretKey) -> Self {
        Self {
            secret,
            expiry: ExpiryPolicy::new(),
        }
    }

    fn create_hmac(&self, exp: &str, salt: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SecureError::invalid_argument(format!("Invalid secret key: {e}")))?;

        mac.update(exp.as_bytes());
        mac.update(b".");
        mac.update(salt.as_bytes());
        Ok(mac)
    }

    fn sign(&self, expires: Expires, salt: &str) -> Result<String> {
        if salt.contains('.') {
            return Err(SecureError::invalid_argument(
                "Nonce salt must not contain '.'",
            ));
        }

        let exp = unix_seconds(&self.expiry.resolve(Some(&expires), None)?).to_string();
        let signature = self.create_hmac(&exp, salt)?.finalize().into_bytes();

        Ok(format!(
            "{exp}.{salt}.{}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    fn verify(&self, nonce: &str) -> Result<()> {
        if nonce.is_empty() {
            return Err(SecureError::missing_token("Missing nonce"));
        }

        let mut parts = nonce.splitn(3, '.');
        let (Some(exp), Some(salt), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(SecureError::invalid_token("Nonce is malformed"));
        };

        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SecureError::invalid_token("Nonce signature is malformed"))?;

        // Constant-time comparison
        self.create_hmac(exp, salt)?
            .verify_slice(&signature)
            .map_err(|_| SecureError::invalid_token("Nonce signature is invalid"))?;

        let exp: i64 = exp
            .parse()
            .map_err(|_| SecureError::invalid_token("Nonce expiry is malformed"))?;
        if exp <= unix_seconds(&self.expiry.now()) {
            return Err(SecureError::invalid_token("Nonce has expired"));
        }

        Ok(())
    }
}

/// Nonces that differ on every call, even for the same expiry.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeDelta, Utc};
/// use via_secure::{RandomSecureNonce, SecureNonce};
///
/// let nonces = RandomSecureNonce::new(b"not_a_secret");
/// let expires = Utc::now() + TimeDelta::seconds(10);
///
/// let first = nonces.create(expires)?;
/// let second = nonces.create(expires)?;
///
/// assert_ne!(first, second);
/// nonces.verify(&first)?;
/// nonces.verify(&second)?;
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Clone)]
pub struct RandomSecureNonce {
    mac: NonceMac,
    salt_generator: SaltGeneratorFn,
}

impl RandomSecureNonce {
    /// Creates a generator salting each nonce with a UUID v4.
    pub fn new(secret: impl Into<SecretKey>) -> Self {
        Self {
            mac: NonceMac::new(secret.into()),
            salt_generator: Arc::new(|| uuid::Uuid::new_v4().simple().to_string()),
        }
    }

    /// Sets a custom salt generator function.
    ///
    /// The generator should produce unique values without `.` characters.
    pub fn with_salt_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.salt_generator = Arc::new(generator);
        self
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.mac.expiry = self.mac.expiry.with_time_provider(provider);
        self
    }
}

impl SecureNonce for RandomSecureNonce {
    fn create(&self, expires: impl Into<Expires>) -> Result<String> {
        let salt = (self.salt_generator)();
        self.mac.sign(expires.into(), &salt)
    }

    fn verify(&self, nonce: &str) -> Result<()> {
        self.mac.verify(nonce)
    }
}

impl fmt::Debug for RandomSecureNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomSecureNonce")
            .field("secret", &self.mac.secret)
            .finish_non_exhaustive()
    }
}

/// Nonces that are a pure function of the secret and the expiry.
///
/// Two callers that agree on an expiry agree on the nonce without sharing
/// any state, which makes this suitable for idempotent retries.
#[derive(Clone)]
pub struct RepeatableSecureNonce {
    mac: NonceMac,
}

impl RepeatableSecureNonce {
    pub fn new(secret: impl Into<SecretKey>) -> Self {
        Self {
            mac: NonceMac::new(secret.into()),
        }
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.mac.expiry = self.mac.expiry.with_time_provider(provider);
        self
    }
}

impl SecureNonce for RepeatableSecureNonce {
    fn create(&self, expires: impl Into<Expires>) -> Result<String> {
        self.mac.sign(expires.into(), "")
    }

    fn verify(&self, nonce: &str) -> Result<()> {
        self.mac.verify(nonce)
    }
}

impl fmt::Debug for RepeatableSecureNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatableSecureNonce")
            .field("secret", &self.mac.secret)
            .finish_non_exhaustive()
    }
}
