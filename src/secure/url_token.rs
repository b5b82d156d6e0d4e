//! Tokens bound to a single URL.
//!
//! The canonical form of the URL is packed into the token's `url` claim, so a
//! token minted for one resource cannot authorize another even though its
//! signature is valid.

use crate::secure::config::SecureConfig;
use crate::secure::error::{Result, SecureError};
use crate::secure::expiry::{Expires, MaxAge};
use crate::secure::key::SecretKey;
use crate::secure::query::remove_params;
use crate::secure::time_utils::TimeProviderFn;
use crate::secure::token::{Payload, TokenCodec};
use serde_json::Value;
use url::Url;

/// Name of the claim holding the bound URL.
pub const URL_CLAIM: &str = "url";

/// A [`TokenCodec`] whose tokens carry a canonical URL.
///
/// # Example
///
/// ```rust
/// use via_secure::{MaxAge, Payload, UrlTokenCodec};
///
/// let codec = UrlTokenCodec::new(b"a_very_secret_secret");
/// let token = codec.create("http://example.com", Payload::new(), None, Some(MaxAge::Seconds(10)))?;
///
/// let decoded = codec.verify(&token, "http://example.com/")?;
/// assert_eq!(decoded["url"], "http://example.com/");
///
/// assert!(codec.verify(&token, "http://other.example.com/").is_err());
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct UrlTokenCodec {
    tokens: TokenCodec,
    stripped_namespace: Option<String>,
}

impl UrlTokenCodec {
    /// Creates a new codec signing with `secret`.
    pub fn new(secret: impl Into<SecretKey>) -> Self {
        Self {
            tokens: TokenCodec::new(secret),
            stripped_namespace: None,
        }
    }

    /// Drops every query parameter whose name starts with `namespace` during
    /// canonicalization.
    pub fn with_stripped_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.stripped_namespace = Some(namespace.into());
        self
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.tokens = self.tokens.with_time_provider(provider);
        self
    }

    /// The codec that signs and checks the underlying tokens.
    pub fn token_codec(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Creates a token bound to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidArgument`] if `url` is empty or the
    /// expiry cannot be resolved.
    pub fn create(
        &self,
        url: &str,
        mut payload: Payload,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<String> {
        if url.is_empty() {
            return Err(SecureError::invalid_argument(
                "A URL is required to create a token",
            ));
        }

        payload.insert(URL_CLAIM.to_string(), Value::from(self.normalize_url(url)));
        self.tokens.create(payload, expires, max_age)
    }

    /// Checks `token` and that it is bound to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidToken`] if the token fails to verify,
    /// carries no URL, or carries a different URL.
    pub fn verify(&self, token: &str, url: &str) -> Result<Payload> {
        let decoded = self.tokens.verify(token)?;

        let signed_url = decoded
            .get(URL_CLAIM)
            .and_then(Value::as_str)
            .ok_or_else(|| SecureError::invalid_token("Secure URL token contains no URL"))?;

        let comparison_url = self.normalize_url(url);
        if signed_url != comparison_url {
            return Err(SecureError::invalid_token(format!(
                "Secure URL token mismatch: got '{comparison_url}' expected '{signed_url}'"
            )));
        }

        Ok(decoded)
    }

    /// Canonicalizes `url`.
    ///
    /// The URL passes through as given apart from two things: a bare host
    /// with no path gains a trailing `/`, and parameters in the stripped
    /// namespace are dropped. Every other query segment keeps its order,
    /// repeats and percent-encoding. Anything that does not parse as an
    /// absolute URL (for example `http://example.com]`) is returned unchanged.
    pub fn normalize_url(&self, url: &str) -> String {
        let url = match &self.stripped_namespace {
            Some(namespace) => remove_params(url, |key| key.starts_with(namespace.as_str())),
            None => url.to_string(),
        };

        with_root_path(&url).unwrap_or(url)
    }
}

/// `url` with a `/` inserted after the authority, if it has a host and no path.
fn with_root_path(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !parsed.has_host() || parsed.cannot_be_a_base() {
        return None;
    }

    let (scheme, rest) = url.split_once("://")?;
    let end = rest.find(['/', '\\', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);
    if tail.starts_with(['/', '\\']) {
        return None;
    }

    Some(format!("{scheme}://{authority}/{tail}"))
}

/// A URL token for proxied requests.
///
/// Expiry is quantized inside a one hour window and every `via.` parameter
/// is ignored, so re-signing an already signed URL is stable.
#[derive(Debug, Clone)]
pub struct ViaUrlTokenCodec {
    inner: UrlTokenCodec,
    max_age: MaxAge,
    divisions: u32,
}

impl ViaUrlTokenCodec {
    /// Creates a codec with the default [`SecureConfig`].
    pub fn new(secret: impl Into<SecretKey>) -> Self {
        Self::with_config(secret, &SecureConfig::default())
    }

    /// Creates a codec using the Via settings in `config`.
    pub fn with_config(secret: impl Into<SecretKey>, config: &SecureConfig) -> Self {
        Self {
            inner: UrlTokenCodec::new(secret).with_stripped_namespace(&config.via_namespace),
            max_age: MaxAge::Span(config.via_max_age),
            divisions: config.quantize_divisions,
        }
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.inner = self.inner.with_time_provider(provider);
        self
    }

    /// The maximum age of the tokens this codec creates.
    pub fn max_age(&self) -> &MaxAge {
        &self.max_age
    }

    /// Creates a token for `url` with a quantized expiry and no extra payload.
    pub fn create(&self, url: &str) -> Result<String> {
        let expires = self
            .inner
            .token_codec()
            .expiry_policy()
            .quantized(&self.max_age, self.divisions)?;

        self.inner
            .create(url, Payload::new(), Some(Expires::At(expires)), None)
    }

    /// Checks `token` against `url`, ignoring `via.` parameters.
    pub fn verify(&self, token: &str, url: &str) -> Result<Payload> {
        self.inner.verify(token, url)
    }

    /// Canonicalizes `url`, dropping every `via.` parameter.
    pub fn normalize_url(&self, url: &str) -> String {
        self.inner.normalize_url(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure::expiry::{DEFAULT_DIVISIONS, ExpiryPolicy};
    use crate::secure::time_utils::fixed_time_provider;
    use crate::secure::token::tests::{payload, peek_claims};
    use chrono::{TimeDelta, TimeZone, Utc};
    use serde_json::json;

    const SECRET: &[u8] = b"a_very_secret_secret";

    #[test]
    fn test_create_normalizes_and_packs_the_url() {
        let codec = UrlTokenCodec::new(SECRET);

        let token = codec
            .create(
                "http://example.com",
                payload(json!({"a": 2})),
                Some(Expires::At(Utc::now() + TimeDelta::seconds(10))),
                None,
            )
            .unwrap();

        let claims = peek_claims(&token);
        assert_eq!(claims["url"], "http://example.com/");
        assert_eq!(claims["a"], 2);
        assert!(claims["exp"].is_i64());
    }

    #[test]
    fn test_create_requires_the_url() {
        let codec = UrlTokenCodec::new(SECRET);

        let result = codec.create("", Payload::new(), None, Some(MaxAge::Seconds(10)));

        assert!(matches!(result, Err(SecureError::InvalidArgument(_))));
    }

    #[test]
    fn test_verify_works_with_a_matching_url() {
        let codec = UrlTokenCodec::new(SECRET);
        let token = codec
            .create("http://example.com", Payload::new(), None, Some(MaxAge::Seconds(10)))
            .unwrap();

        let decoded = codec.verify(&token, "http://example.com/").unwrap();

        assert_eq!(decoded["url"], "http://example.com/");
    }

    #[test]
    fn test_verify_fails_if_there_is_no_url_in_the_token() {
        let codec = UrlTokenCodec::new(SECRET);
        let no_url_token = TokenCodec::new(SECRET)
            .create(Payload::new(), None, Some(MaxAge::Seconds(10)))
            .unwrap();

        let result = codec.verify(&no_url_token, "http://any.example.com/");

        assert!(matches!(result, Err(SecureError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_fails_if_there_is_url_mismatch() {
        let codec = UrlTokenCodec::new(SECRET);
        let token = codec
            .create("http://example.com", Payload::new(), None, Some(MaxAge::Seconds(10)))
            .unwrap();

        let result = codec.verify(&token, "http://DIFFERENT.example.com/");

        assert!(matches!(result, Err(SecureError::InvalidToken(_))));
    }

    #[test]
    fn test_normalize_url() {
        let codec = UrlTokenCodec::new(SECRET);
        let cases = [
            ("http://example.com/", "http://example.com/"),
            ("http://example.com", "http://example.com/"),
            ("http://example.com]", "http://example.com]"),
        ];

        for query_string in ["", "?a=b"] {
            for (url, normalized) in cases {
                assert_eq!(
                    codec.normalize_url(&format!("{url}{query_string}")),
                    format!("{normalized}{query_string}")
                );
            }
        }
    }

    #[test]
    fn test_normalize_url_is_idempotent_and_keeps_query_order() {
        let codec = UrlTokenCodec::new(SECRET);
        let url = "http://example.com/path?b=2&a=1&b=3";

        let once = codec.normalize_url(url);

        assert_eq!(once, url);
        assert_eq!(codec.normalize_url(&once), once);
    }

    #[test]
    fn test_normalize_url_passes_paths_and_encodings_through() {
        let codec = UrlTokenCodec::new(SECRET);

        for url in [
            "http://Example.COM/a/../b",
            "http://example.com/a b",
            "https://example.com/doc?q=a%20b&flag&q=a+b",
            "http://example.com/#frag",
            "mailto:someone@example.com",
        ] {
            assert_eq!(codec.normalize_url(url), url);
        }
    }

    #[test]
    fn test_normalize_url_only_adds_a_root_path() {
        let codec = UrlTokenCodec::new(SECRET);

        assert_eq!(
            codec.normalize_url("http://Example.COM:80"),
            "http://Example.COM:80/"
        );
        assert_eq!(
            codec.normalize_url("http://example.com?a=b"),
            "http://example.com/?a=b"
        );
        assert_eq!(
            codec.normalize_url("http://example.com#frag"),
            "http://example.com/#frag"
        );
    }

    #[test]
    fn test_via_create_works() {
        let codec = ViaUrlTokenCodec::new(SECRET);

        let token = codec.create("http://example.com?via.config=blah").unwrap();

        let claims = peek_claims(&token);
        assert_eq!(claims["url"], "http://example.com/");
        assert!(claims["exp"].is_i64());
        assert_eq!(claims.len(), 2);
    }

    #[test]
    fn test_via_create_uses_a_quantized_expiry() {
        let now = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let codec = ViaUrlTokenCodec::new(SECRET).with_time_provider(fixed_time_provider(now));

        let token = codec.create("*any*").unwrap();

        let expected = ExpiryPolicy::new()
            .with_time_provider(fixed_time_provider(now))
            .quantized(&MaxAge::Span(TimeDelta::hours(1)), DEFAULT_DIVISIONS)
            .unwrap();
        assert_eq!(peek_claims(&token)["exp"], expected.timestamp());
        assert_eq!(peek_claims(&token)["url"], "*any*");
    }

    #[test]
    fn test_via_normalize_url_strips_via_params() {
        let codec = ViaUrlTokenCodec::new(SECRET);

        assert_eq!(
            codec.normalize_url("http://example.com?a=b&via.config=boo"),
            "http://example.com/?a=b"
        );
        assert_eq!(
            codec.normalize_url("http://example.com?via.sec=abc"),
            "http://example.com/"
        );
    }

    #[test]
    fn test_via_normalize_url_keeps_other_params_verbatim() {
        let codec = ViaUrlTokenCodec::new(SECRET);

        assert_eq!(
            codec.normalize_url("http://example.com/p?q=a%20b&flag&via.x=1"),
            "http://example.com/p?q=a%20b&flag"
        );

        let normalized = codec.normalize_url("http://example.com/p?b=2&via.a=1&a=1&b=3#frag");
        assert_eq!(normalized, "http://example.com/p?b=2&a=1&b=3#frag");
        assert_eq!(codec.normalize_url(&normalized), normalized);
    }

    #[test]
    fn test_via_verify_ignores_via_params() {
        let codec = ViaUrlTokenCodec::new(SECRET);

        let token = codec.create("http://example.com?a=b").unwrap();

        let decoded = codec
            .verify(&token, "http://example.com/?a=b&via.sec=anything")
            .unwrap();
        assert_eq!(decoded["url"], "http://example.com/?a=b");
    }
}
