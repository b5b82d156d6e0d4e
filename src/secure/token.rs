//! Signed, expiring tokens.
//!
//! A token is a compact JWS (the JWT wire format) signed with HMAC-SHA256
//! under the codec's secret. The claim set is the caller's payload plus one
//! integer `exp` claim. Verifiers accept [`TOKEN_ALGORITHM`] only, so a token
//! whose header names any other algorithm is rejected.

use crate::secure::error::{Result, SecureError};
use crate::secure::expiry::{Expires, ExpiryPolicy, MaxAge};
use crate::secure::key::SecretKey;
use crate::secure::time_utils::{TimeProviderFn, unix_seconds};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::Value;
use std::fmt;

/// The claims carried inside a token.
pub type Payload = serde_json::Map<String, Value>;

/// The only signing algorithm tokens are created with or accepted under.
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Name of the expiry claim.
pub const EXP_CLAIM: &str = "exp";

/// Something that can mint and check token strings.
///
/// [`TokenBasedCookie`](crate::TokenBasedCookie) is generic over this trait
/// so any token codec can back a cookie.
pub trait TokenProvider: Send + Sync {
    /// Creates a token carrying `payload`.
    fn create(
        &self,
        payload: Payload,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<String>;

    /// Checks a token and returns the claims it carries.
    fn verify(&self, token: &str) -> Result<Payload>;
}

/// Packs a payload and an expiry into a signed token and checks it again.
///
/// # Example
///
/// ```rust
/// use via_secure::{MaxAge, Payload, TokenCodec};
///
/// let codec = TokenCodec::new(b"a_very_secret_secret");
///
/// let mut payload = Payload::new();
/// payload.insert("a".to_string(), 2.into());
///
/// let token = codec.create(payload, None, Some(MaxAge::Seconds(10)))?;
/// let decoded = codec.verify(&token)?;
///
/// assert_eq!(decoded["a"], 2);
/// assert!(decoded["exp"].is_i64());
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Clone)]
pub struct TokenCodec {
    secret: SecretKey,
    expiry: ExpiryPolicy,
}

impl TokenCodec {
    /// Creates a new codec signing with `secret`.
    pub fn new(secret: impl Into<SecretKey>) -> Self {
        Self {
            secret: secret.into(),
            expiry: ExpiryPolicy::new(),
        }
    }

    /// Sets a custom time provider function.
    ///
    /// The provider is used both to resolve `max_age` and to decide whether
    /// a token has expired.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.expiry = self.expiry.with_time_provider(provider);
        self
    }

    /// The expiry policy this codec resolves expiries with.
    pub fn expiry_policy(&self) -> &ExpiryPolicy {
        &self.expiry
    }

    /// Creates a token for `payload` which expires at `expires` or after
    /// `max_age`.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidArgument`] if the expiry cannot be
    /// resolved.
    pub fn create(
        &self,
        payload: Payload,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<String> {
        let exp = self.expiry.resolve(expires.as_ref(), max_age.as_ref())?;
        self.sign(payload, exp)
    }

    /// Signs `payload` with an already resolved expiry.
    pub(crate) fn sign(&self, mut payload: Payload, exp: DateTime<Utc>) -> Result<String> {
        let exp = unix_seconds(&exp);
        payload.insert(EXP_CLAIM.to_string(), Value::from(exp));

        let token = jsonwebtoken::encode(
            &Header::new(TOKEN_ALGORITHM),
            &payload,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| SecureError::invalid_argument(format!("Payload cannot be signed: {e}")))?;

        tracing::debug!(exp, "created token");
        Ok(token)
    }

    /// Checks the signature and expiry of `token` and returns its claims.
    ///
    /// # Errors
    ///
    /// - [`SecureError::MissingToken`] if `token` is empty
    /// - [`SecureError::InvalidToken`] if the token is malformed, signed
    ///   under another secret or algorithm, or expired
    pub fn verify(&self, token: &str) -> Result<Payload> {
        if token.is_empty() {
            return Err(SecureError::missing_token("Missing secure token"));
        }

        self.decode(token).inspect_err(|e| {
            tracing::warn!(error = %e, "token verification failed");
        })
    }

    fn decode(&self, token: &str) -> Result<Payload> {
        // Expiry is checked below against this codec's own clock.
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&[EXP_CLAIM]);

        let data = jsonwebtoken::decode::<Payload>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| SecureError::invalid_token(format!("Secure token is invalid: {e}")))?;

        let exp = data
            .claims
            .get(EXP_CLAIM)
            .and_then(Value::as_i64)
            .ok_or_else(|| SecureError::invalid_token("Secure token has no valid expiry"))?;

        if exp <= unix_seconds(&self.expiry.now()) {
            return Err(SecureError::invalid_token("Secure token has expired"));
        }

        Ok(data.claims)
    }
}

impl TokenProvider for TokenCodec {
    fn create(
        &self,
        payload: Payload,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<String> {
        TokenCodec::create(self, payload, expires, max_age)
    }

    fn verify(&self, token: &str) -> Result<Payload> {
        TokenCodec::verify(self, token)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret", &self.secret)
            .field("algorithm", &TOKEN_ALGORITHM)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::secure::time_utils::fixed_time_provider;
    use base64::Engine;
    use chrono::{TimeDelta, TimeZone};
    use serde_json::json;

    const SECRET: &[u8] = b"a_very_secret_secret";

    pub(crate) fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    /// Decodes a token's claims without checking anything.
    pub(crate) fn peek_claims(token: &str) -> Payload {
        let claims = token.split('.').nth(1).unwrap();
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(claims)
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn in_ten_seconds() -> Option<Expires> {
        Some(Expires::At(Utc::now() + TimeDelta::seconds(10)))
    }

    #[test]
    fn test_create_works() {
        let codec = TokenCodec::new(SECRET);

        let token = codec
            .create(payload(json!({"a": 2})), in_ten_seconds(), None)
            .unwrap();

        let claims = peek_claims(&token);
        assert_eq!(claims["a"], 2);
        assert!(claims["exp"].is_i64());
        assert_eq!(claims.len(), 2);
    }

    #[test]
    fn test_create_works_with_a_max_age() {
        let now = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let codec = TokenCodec::new(SECRET).with_time_provider(fixed_time_provider(now));

        let token = codec
            .create(payload(json!({"a": 2})), None, Some(MaxAge::Seconds(10)))
            .unwrap();

        assert_eq!(
            peek_claims(&token),
            payload(json!({"a": 2, "exp": now.timestamp() + 10}))
        );
    }

    #[test]
    fn test_create_fails_if_no_expiry_is_set() {
        let codec = TokenCodec::new(SECRET);

        let result = codec.create(Payload::new(), None, None);

        assert!(matches!(result, Err(SecureError::InvalidArgument(_))));
    }

    #[test]
    fn test_verify_decodes_a_good_token() {
        let codec = TokenCodec::new(SECRET);
        let expires = Utc::now() + TimeDelta::seconds(10);

        let token = codec
            .create(payload(json!({"a": 2})), Some(Expires::At(expires)), None)
            .unwrap();
        let decoded = codec.verify(&token).unwrap();

        assert_eq!(
            decoded,
            payload(json!({"a": 2, "exp": expires.timestamp()}))
        );
    }

    #[test]
    fn test_verify_catches_there_being_no_value() {
        let codec = TokenCodec::new(SECRET);

        assert!(matches!(codec.verify(""), Err(SecureError::MissingToken(_))));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let codec = TokenCodec::new(SECRET);

        for token in ["fake_token", "a.b.c", "..."] {
            assert!(matches!(
                codec.verify(token),
                Err(SecureError::InvalidToken(_))
            ));
        }
    }

    #[test]
    fn test_verify_rejects_another_secret() {
        let token = TokenCodec::new(b"secret_one")
            .create(Payload::new(), None, Some(MaxAge::Seconds(10)))
            .unwrap();

        let result = TokenCodec::new(b"secret_two").verify(&token);

        assert!(matches!(result, Err(SecureError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_rejects_an_expired_token() {
        let signed_at = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let token = TokenCodec::new(SECRET)
            .with_time_provider(fixed_time_provider(signed_at))
            .create(Payload::new(), None, Some(MaxAge::Seconds(10)))
            .unwrap();

        let still_valid = TokenCodec::new(SECRET)
            .with_time_provider(fixed_time_provider(signed_at + TimeDelta::seconds(9)));
        let expired = TokenCodec::new(SECRET)
            .with_time_provider(fixed_time_provider(signed_at + TimeDelta::seconds(10)));

        assert!(still_valid.verify(&token).is_ok());
        assert!(matches!(
            expired.verify(&token),
            Err(SecureError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_verify_rejects_another_algorithm() {
        let claims = payload(json!({"exp": (Utc::now() + TimeDelta::seconds(10)).timestamp()}));
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        let result = TokenCodec::new(SECRET).verify(&token);

        assert!(matches!(result, Err(SecureError::InvalidToken(_))));
    }

    #[test]
    fn test_verify_requires_an_expiry_claim() {
        let token = jsonwebtoken::encode(
            &Header::new(TOKEN_ALGORITHM),
            &payload(json!({"a": 1})),
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        let result = TokenCodec::new(SECRET).verify(&token);

        assert!(matches!(result, Err(SecureError::InvalidToken(_))));
    }

    #[test]
    fn test_tokens_are_deterministic() {
        let codec = TokenCodec::new(SECRET);
        let expires = Utc::now() + TimeDelta::seconds(60);

        let first = codec
            .create(payload(json!({"b": 1, "a": 2})), Some(Expires::At(expires)), None)
            .unwrap();
        let second = codec
            .create(payload(json!({"a": 2, "b": 1})), Some(Expires::At(expires)), None)
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_debug_does_not_leak_the_secret() {
        let debug_str = format!("{:?}", TokenCodec::new(SECRET));

        assert!(!debug_str.contains("a_very_secret_secret"));
        assert!(debug_str.contains("HS256"));
    }
}
