//! Signing URLs with a token carried in a query parameter.
//!
//! Three flavours build on one another:
//!
//! - [`UrlSigner`] appends the full token, which can carry extra payload and
//!   a relative expiry.
//! - [`HashedUrlSigner`] appends only the SHA-256 of the token. The verifier
//!   recomputes the token from the URL and a known absolute expiry, so no
//!   payload travels with the URL.
//! - [`ViaUrlSigner`] fixes the expiry to the current quantization bucket, so
//!   a URL signed and checked within one bucket needs no expiry parameter.
//!
//! Query strings are handled segment by segment: apart from the signature
//! parameter, every segment is kept verbatim and in order.

use crate::secure::config::SecureConfig;
use crate::secure::error::{Result, SecureError};
use crate::secure::expiry::{Expires, MaxAge};
use crate::secure::key::SecretKey;
use crate::secure::query::{UrlParts, segment_pair};
use crate::secure::time_utils::TimeProviderFn;
use crate::secure::token::{Payload, TokenCodec};
use crate::secure::url_token::URL_CLAIM;
use crate::securelink::compare_digest;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Appends, finds, and removes one reserved query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenParam(String);

impl TokenParam {
    fn get(&self, url: &str) -> Option<String> {
        UrlParts::split(url)
            .segments()
            .filter_map(segment_pair)
            .filter(|(key, _)| *key == self.0)
            .map(|(_, value)| value)
            .last()
            .filter(|value| !value.is_empty())
    }

    fn kept_segments(&self, parts: &UrlParts<'_>) -> Vec<String> {
        parts
            .segments()
            .filter(|segment| !matches!(segment_pair(segment), Some((key, _)) if key == self.0))
            .map(str::to_string)
            .collect()
    }

    fn strip(&self, url: &str) -> String {
        let parts = UrlParts::split(url);
        parts.join(&self.kept_segments(&parts))
    }

    fn set(&self, url: &str, value: &str) -> String {
        let parts = UrlParts::split(url);
        let mut segments = self.kept_segments(&parts);
        segments.push(
            form_urlencoded::Serializer::new(String::new())
                .append_pair(&self.0, value)
                .finish(),
        );
        parts.join(&segments)
    }
}

/// Signs URLs by appending a token as a query parameter.
///
/// # Example
///
/// ```rust
/// use via_secure::{MaxAge, Payload, UrlSigner};
///
/// let signer = UrlSigner::new(b"not_a_secret", "tok.sec");
///
/// let mut payload = Payload::new();
/// payload.insert("extra".to_string(), "value".into());
///
/// let signed = signer.create("http://example.com?a=1&a=2", payload, None, Some(MaxAge::Seconds(10)))?;
/// assert!(signed.starts_with("http://example.com?a=1&a=2&tok.sec="));
///
/// let decoded = signer.verify(&signed)?;
/// assert_eq!(decoded["url"], "http://example.com?a=1&a=2");
/// assert_eq!(decoded["extra"], "value");
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct UrlSigner {
    tokens: TokenCodec,
    param: TokenParam,
}

impl UrlSigner {
    /// Creates a signer storing its token in the `token_param` query parameter.
    pub fn new(secret: impl Into<SecretKey>, token_param: impl Into<String>) -> Self {
        Self {
            tokens: TokenCodec::new(secret),
            param: TokenParam(token_param.into()),
        }
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.tokens = self.tokens.with_time_provider(provider);
        self
    }

    /// The query parameter holding the signature.
    pub fn token_param(&self) -> &str {
        &self.param.0
    }

    pub(crate) fn token_codec(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Signs `url`, replacing any signature it already carries.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidArgument`] if `url` is empty or the
    /// expiry cannot be resolved.
    pub fn create(
        &self,
        url: &str,
        payload: Payload,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<String> {
        let (stripped, token) = self.sign(url, payload, expires, max_age)?;

        tracing::debug!(param = %self.param.0, "signed url");
        Ok(self.param.set(&stripped, &token))
    }

    /// Checks that `url` carries a valid token minted for this URL.
    ///
    /// # Errors
    ///
    /// - [`SecureError::MissingToken`] if the parameter is absent
    /// - [`SecureError::InvalidToken`] if the token fails or names another URL
    pub fn verify(&self, url: &str) -> Result<Payload> {
        let token = self.extract(url)?;
        self.check(&token, &self.param.strip(url))
    }

    /// Returns `url` without its signature parameter and the token for it.
    pub(crate) fn sign(
        &self,
        url: &str,
        mut payload: Payload,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<(String, String)> {
        if url.is_empty() {
            return Err(SecureError::invalid_argument(
                "A URL is required to create a token",
            ));
        }

        let stripped = self.param.strip(url);
        payload.insert(URL_CLAIM.to_string(), Value::from(stripped.as_str()));
        let token = self.tokens.create(payload, expires, max_age)?;
        Ok((stripped, token))
    }

    pub(crate) fn extract(&self, url: &str) -> Result<String> {
        self.param.get(url).ok_or_else(|| {
            SecureError::missing_token(format!("Missing '{}' parameter in URL", self.param.0))
        })
    }

    /// Verifies `token` and that it was minted for `stripped_url`.
    pub(crate) fn check(&self, token: &str, stripped_url: &str) -> Result<Payload> {
        let decoded = self.tokens.verify(token)?;

        let signed_url = decoded
            .get(URL_CLAIM)
            .and_then(Value::as_str)
            .ok_or_else(|| SecureError::invalid_token("Secure URL token contains no URL"))?;

        if signed_url != stripped_url {
            tracing::warn!(param = %self.param.0, "signed url mismatch");
            return Err(SecureError::invalid_token(format!(
                "Secure URL token path mismatch: got '{stripped_url}' expected '{signed_url}'"
            )));
        }

        Ok(decoded)
    }
}

/// Signs URLs with the SHA-256 of a token instead of the token itself.
///
/// Verification recomputes the token, so only an absolute expiry known to
/// both sides is supported and no extra payload can be carried.
#[derive(Debug, Clone)]
pub struct HashedUrlSigner {
    inner: UrlSigner,
}

impl HashedUrlSigner {
    /// Creates a signer storing its hash in the `token_param` query parameter.
    pub fn new(secret: impl Into<SecretKey>, token_param: impl Into<String>) -> Self {
        Self {
            inner: UrlSigner::new(secret, token_param),
        }
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.inner = self.inner.with_time_provider(provider);
        self
    }

    /// The query parameter holding the hash.
    pub fn token_param(&self) -> &str {
        self.inner.token_param()
    }

    pub(crate) fn token_codec(&self) -> &TokenCodec {
        self.inner.token_codec()
    }

    /// Signs `url` with a hash of a token expiring at `expires`.
    pub fn create(&self, url: &str, expires: impl Into<Expires>) -> Result<String> {
        let (stripped, token) = self
            .inner
            .sign(url, Payload::new(), Some(expires.into()), None)?;

        tracing::debug!(param = %self.token_param(), "signed url with token hash");
        Ok(self.inner.param.set(&stripped, &hash_token(&token)))
    }

    /// Checks the hash in `url` against the token expected for `expires`.
    ///
    /// Returns the claims of the recomputed token (`url` and `exp`).
    ///
    /// # Errors
    ///
    /// - [`SecureError::MissingToken`] if the parameter is absent
    /// - [`SecureError::InvalidToken`] if the hashes differ or the recomputed
    ///   token has expired
    pub fn verify(&self, url: &str, expires: impl Into<Expires>) -> Result<Payload> {
        let hashed_token = self.inner.extract(url)?;

        let (stripped, expected_token) =
            self.inner
                .sign(url, Payload::new(), Some(expires.into()), None)?;

        if !compare_digest(&hashed_token, &hash_token(&expected_token)) {
            tracing::warn!(param = %self.token_param(), "secure url hashes don't match");
            return Err(SecureError::invalid_token("Secure URL hashes don't match"));
        }

        self.inner.check(&expected_token, &stripped)
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Signs proxied URLs with a short hash valid for the current time bucket.
///
/// # Example
///
/// ```rust
/// use via_secure::ViaUrlSigner;
///
/// let signer = ViaUrlSigner::new(b"not_a_secret");
///
/// let signed = signer.create("http://example.com?via.sec=OLD_TOKEN")?;
/// let decoded = signer.verify(&signed)?;
///
/// assert_eq!(decoded["url"], "http://example.com");
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ViaUrlSigner {
    inner: HashedUrlSigner,
    max_age: MaxAge,
    divisions: u32,
}

impl ViaUrlSigner {
    /// Creates a signer with the default [`SecureConfig`].
    pub fn new(secret: impl Into<SecretKey>) -> Self {
        Self::with_config(secret, &SecureConfig::default())
    }

    /// Creates a signer using the Via settings in `config`.
    pub fn with_config(secret: impl Into<SecretKey>, config: &SecureConfig) -> Self {
        Self {
            inner: HashedUrlSigner::new(secret, config.via_token_param.clone()),
            max_age: MaxAge::Span(config.via_max_age),
            divisions: config.quantize_divisions,
        }
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.inner = self.inner.with_time_provider(provider);
        self
    }

    /// The maximum age of the signatures this signer creates.
    pub fn max_age(&self) -> &MaxAge {
        &self.max_age
    }

    fn current_expiry(&self) -> Result<Expires> {
        self.inner
            .token_codec()
            .expiry_policy()
            .quantized(&self.max_age, self.divisions)
            .map(Expires::At)
    }

    /// Signs `url`, replacing any Via signature it already carries.
    pub fn create(&self, url: &str) -> Result<String> {
        self.inner.create(url, self.current_expiry()?)
    }

    /// Checks a URL signed within the current quantization bucket.
    ///
    /// A URL signed in an earlier bucket is indistinguishable from a forgery
    /// and fails with [`SecureError::InvalidToken`].
    pub fn verify(&self, url: &str) -> Result<Payload> {
        self.inner.verify(url, self.current_expiry()?)
    }
}
