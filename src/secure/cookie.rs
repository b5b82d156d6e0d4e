//! `Set-Cookie` headers and the cookies they set.

use crate::secure::config::SecureConfig;
use crate::secure::error::{Result, SecureError};
use crate::secure::expiry::{Expires, MaxAge};
use crate::secure::token::{Payload, TokenProvider};

/// Name of the response header [`Cookie::create`] produces.
pub const SET_COOKIE: &str = "Set-Cookie";

/// Date format of the `expires` attribute.
const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// A header name and value pair.
pub type Header = (&'static str, String);

/// A named cookie that is always `HttpOnly` on path `/`.
///
/// Secure cookies (the default) are also marked `SameSite=None; Secure` so
/// they are sent on cross-site requests over HTTPS.
///
/// # Example
///
/// ```rust
/// use via_secure::{Cookie, MaxAge};
///
/// let (header, value) = Cookie::new("session").create("abc", None, Some(MaxAge::Seconds(321)))?;
///
/// assert_eq!(header, "Set-Cookie");
/// assert_eq!(value, "session=abc; HttpOnly; Max-Age=321; Path=/; SameSite=None; Secure");
/// assert_eq!(Cookie::new("session").verify(Some("other=1; session=abc")), Some("abc".to_string()));
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secure: true,
        }
    }

    /// Creates a cookie whose security attributes follow `config`.
    pub fn with_config(name: impl Into<String>, config: &SecureConfig) -> Self {
        Self::new(name).with_secure(config.cookie_secure)
    }

    /// Sets whether the cookie is marked `SameSite=None; Secure`.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds the `Set-Cookie` header storing `value`.
    ///
    /// The header carries exactly one expiry attribute. When both `expires`
    /// and `max_age` are given, `expires` wins.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidArgument`] if neither `expires` nor
    /// `max_age` is given, if `expires` has no timezone, or if the chosen
    /// value cannot be interpreted.
    pub fn create(
        &self,
        value: &str,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<Header> {
        // Exactly one expiry attribute; an absolute expiry wins over max_age.
        // Attributes are written in case-insensitive name order.
        let mut parts = vec![format!("{}={value}", self.name)];
        match (&expires, &max_age) {
            (Some(expires), _) => {
                let at = expires.to_utc_strict()?;
                parts.push(format!("expires={}", at.format(EXPIRES_FORMAT)));
                parts.push("HttpOnly".to_string());
            }
            (None, Some(max_age)) => {
                parts.push("HttpOnly".to_string());
                parts.push(format!("Max-Age={}", max_age.to_seconds()?));
            }
            (None, None) => {
                return Err(SecureError::invalid_argument(
                    "A cookie requires expires or max_age",
                ));
            }
        }
        parts.push("Path=/".to_string());
        if self.secure {
            parts.push("SameSite=None".to_string());
            parts.push("Secure".to_string());
        }

        tracing::debug!(name = %self.name, secure = self.secure, "created cookie");
        Ok((SET_COOKIE, parts.join("; ")))
    }

    /// Finds this cookie's value in a `Cookie` request header.
    ///
    /// Pairs may be separated by spaces, `;`, or both. The first pair with a
    /// matching name wins.
    pub fn verify(&self, cookies: Option<&str>) -> Option<String> {
        cookies?
            .split(|c: char| c == ';' || c.is_whitespace())
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.to_string())
    }
}

/// A cookie whose value is a token minted and checked by `P`.
///
/// # Example
///
/// ```rust
/// use via_secure::{MaxAge, Payload, TokenBasedCookie, TokenCodec};
///
/// let cookie = TokenBasedCookie::new("session", TokenCodec::new(b"secret"));
///
/// let mut payload = Payload::new();
/// payload.insert("user".to_string(), "acct:someone".into());
///
/// let (_, header) = cookie.create(payload, None, Some(MaxAge::Seconds(60)))?;
/// let token = header.split(';').next().unwrap_or_default().trim_start_matches("session=");
///
/// let decoded = cookie.verify(Some(&format!("session={token}")))?;
/// assert_eq!(decoded["user"], "acct:someone");
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Debug, Clone)]
pub struct TokenBasedCookie<P> {
    cookie: Cookie,
    provider: P,
}

impl<P: TokenProvider> TokenBasedCookie<P> {
    pub fn new(name: impl Into<String>, provider: P) -> Self {
        Self {
            cookie: Cookie::new(name),
            provider,
        }
    }

    /// Sets whether the cookie is marked `SameSite=None; Secure`.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.cookie = self.cookie.with_secure(secure);
        self
    }

    pub fn cookie(&self) -> &Cookie {
        &self.cookie
    }

    /// Mints a token for `payload` and wraps it in a `Set-Cookie` header
    /// with the same expiry.
    pub fn create(
        &self,
        payload: Payload,
        expires: Option<Expires>,
        max_age: Option<MaxAge>,
    ) -> Result<Header> {
        let token = self
            .provider
            .create(payload, expires.clone(), max_age.clone())?;
        self.cookie.create(&token, expires, max_age)
    }

    /// Extracts the token from a `Cookie` request header and checks it.
    ///
    /// # Errors
    ///
    /// - [`SecureError::MissingToken`] if the cookie is not present
    /// - whatever the provider reports for a bad token
    pub fn verify(&self, cookies: Option<&str>) -> Result<Payload> {
        let token = self.cookie.verify(cookies).ok_or_else(|| {
            SecureError::missing_token(format!("Missing cookie '{}'", self.cookie.name()))
        })?;

        self.provider.verify(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure::token::tests::payload;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    type CreateCall = (Payload, Option<Expires>, Option<MaxAge>);

    /// Records its calls and hands out canned answers.
    #[derive(Default)]
    struct RecordingProvider {
        created: Mutex<Vec<CreateCall>>,
        verified: Mutex<Vec<String>>,
    }

    impl TokenProvider for RecordingProvider {
        fn create(
            &self,
            payload: Payload,
            expires: Option<Expires>,
            max_age: Option<MaxAge>,
        ) -> Result<String> {
            self.created.lock().unwrap().push((payload, expires, max_age));
            Ok("token-value".to_string())
        }

        fn verify(&self, token: &str) -> Result<Payload> {
            self.verified.lock().unwrap().push(token.to_string());
            Ok(payload(json!({"verified": token})))
        }
    }

    fn expires() -> Expires {
        Expires::At(Utc.with_ymd_and_hms(2010, 11, 21, 4, 34, 38).unwrap())
    }

    #[test]
    fn test_create() {
        let cookie = Cookie::new("name").create("value", Some(expires()), None);

        assert_eq!(
            cookie.unwrap(),
            (
                "Set-Cookie",
                "name=value; expires=Sun, 21 Nov 2010 04:34:38 UTC; HttpOnly; Path=/; SameSite=None; Secure"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_create_can_make_a_non_secure_cookie() {
        let (_, value) = Cookie::new("name")
            .with_secure(false)
            .create("value", None, Some(MaxAge::Seconds(10)))
            .unwrap();

        assert!(!value.contains("SameSite"));
        assert!(!value.contains("Secure"));
    }

    #[test]
    fn test_with_config() {
        let config = SecureConfig {
            cookie_secure: false,
            ..SecureConfig::default()
        };

        let (_, value) = Cookie::with_config("name", &config)
            .create("value", None, Some(MaxAge::Seconds(10)))
            .unwrap();

        assert_eq!(value, "name=value; HttpOnly; Max-Age=10; Path=/");
    }

    #[test]
    fn test_create_with_max_age() {
        let cookie = Cookie::new("name").create("value", None, Some(MaxAge::Seconds(321)));

        assert_eq!(
            cookie.unwrap(),
            (
                "Set-Cookie",
                "name=value; HttpOnly; Max-Age=321; Path=/; SameSite=None; Secure".to_string()
            )
        );
    }

    #[test]
    fn test_create_prefers_expires_over_max_age() {
        let (_, value) = Cookie::new("name")
            .create("value", Some(expires()), Some(MaxAge::Seconds(321)))
            .unwrap();

        assert_eq!(
            value,
            "name=value; expires=Sun, 21 Nov 2010 04:34:38 UTC; HttpOnly; Path=/; SameSite=None; Secure"
        );
    }

    #[test]
    fn test_create_writes_exactly_one_expiry_attribute() {
        let cookie = Cookie::new("name");
        let cases = [
            (Some(expires()), None),
            (None, Some(MaxAge::Seconds(10))),
            (Some(expires()), Some(MaxAge::Seconds(10))),
        ];

        for (expires, max_age) in cases {
            let (_, value) = cookie.create("value", expires, max_age).unwrap();
            let expiry_attributes = value
                .split("; ")
                .filter(|attribute| {
                    attribute.starts_with("expires=") || attribute.starts_with("Max-Age=")
                })
                .count();

            assert_eq!(expiry_attributes, 1, "{value}");
        }
    }

    #[test]
    fn test_create_converts_offsets_to_utc() {
        let (_, value) = Cookie::new("name")
            .create("value", Some(Expires::from("2010-11-21T06:34:38+02:00")), None)
            .unwrap();

        assert!(value.contains("expires=Sun, 21 Nov 2010 04:34:38 UTC"));
    }

    #[test]
    fn test_create_requires_an_expiry() {
        let result = Cookie::new("any").create("value", None, None);

        assert!(matches!(result, Err(SecureError::InvalidArgument(_))));
    }

    #[test]
    fn test_create_raises_if_the_expiry_has_no_timezone() {
        let naive = NaiveDate::from_ymd_opt(2010, 11, 21)
            .unwrap()
            .and_hms_opt(4, 34, 38)
            .unwrap();

        let result = Cookie::new("any").create("value", Some(Expires::Naive(naive)), None);

        assert!(matches!(result, Err(SecureError::InvalidArgument(_))));
    }

    #[test]
    fn test_verify() {
        let cookie = Cookie::new("name");
        let cases = [
            (Some("noise=irrelevant name=value"), Some("value")),
            (Some("noise=irrelevant; name=value"), Some("value")),
            (Some("name=first; name=second"), Some("first")),
            (Some("noise=irrelevant"), None),
            (Some("names=value"), None),
            (Some(""), None),
            (None, None),
        ];

        for (cookies, value) in cases {
            assert_eq!(
                cookie.verify(cookies),
                value.map(str::to_string),
                "{cookies:?}"
            );
        }
    }

    #[test]
    fn test_token_based_cookie_create() {
        let cookie = TokenBasedCookie::new("name", RecordingProvider::default());

        let result = cookie.create(payload(json!({"pass-through": "args"})), Some(expires()), None);

        assert_eq!(
            result.unwrap(),
            (
                "Set-Cookie",
                "name=token-value; expires=Sun, 21 Nov 2010 04:34:38 UTC; HttpOnly; Path=/; SameSite=None; Secure"
                    .to_string()
            )
        );
        assert_eq!(
            *cookie.provider.created.lock().unwrap(),
            vec![(payload(json!({"pass-through": "args"})), Some(expires()), None)]
        );
    }

    #[test]
    fn test_token_based_cookie_verify() {
        let cookie = TokenBasedCookie::new("name", RecordingProvider::default());

        let result = cookie.verify(Some("noise=irrelevant name=token-value"));

        assert_eq!(result.unwrap(), payload(json!({"verified": "token-value"})));
        assert_eq!(
            *cookie.provider.verified.lock().unwrap(),
            vec!["token-value".to_string()]
        );
    }

    #[test]
    fn test_token_based_cookie_verify_raises_if_cookie_missing() {
        let cookie = TokenBasedCookie::new("name", RecordingProvider::default());

        let result = cookie.verify(Some("noise=irrelevant"));

        assert!(matches!(result, Err(SecureError::MissingToken(_))));
        assert!(cookie.provider.verified.lock().unwrap().is_empty());
    }
}
