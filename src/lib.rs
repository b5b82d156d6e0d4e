//! # Via Secure
//!
//! Expiring, tamper-evident tokens for signing proxied URLs and cookies.
//!
//! A proxy and the services that link to it share one secret. With it they
//! can mint values that the other side can check later without keeping any
//! state: signed tokens, URLs carrying their own signature, cookies and
//! one-off nonces.
//!
//! ## Features
//!
//! - **Signed Tokens**: HS256 JWS tokens with a mandatory `exp` claim
//! - **URL Binding**: Tokens that only authorize one canonical URL
//! - **Signed URLs**: Signatures carried in a reserved query parameter
//! - **Quantized Expiry**: Repeatable expiries so the same URL signs identically within a window
//! - **Cookies**: `Set-Cookie` headers holding tokens
//! - **Nonces**: Random or repeatable HMAC-SHA256 nonces
//! - **Envelopes**: AES-CFB8 encryption of small JSON payloads
//! - **Link Digests**: nginx `secure_link_md5` compatible digests
//!
//! ## Quick Start
//!
//! ### Signing a URL
//!
//! ```rust
//! use via_secure::{SecureError, ViaUrlSigner};
//!
//! let signer = ViaUrlSigner::new(b"shared_secret_key");
//!
//! let signed = signer.create("https://example.com/document.pdf?page=2")?;
//! assert!(signed.contains("via.sec="));
//!
//! match signer.verify(&signed) {
//!     Ok(_) => println!("URL accepted"),
//!     Err(e) => println!("URL rejected: {e}"),
//! }
//!
//! // Any change to the signed URL is detected
//! let tampered = signed.replace("page=2", "page=3");
//! assert!(matches!(signer.verify(&tampered), Err(SecureError::InvalidToken(_))));
//! # Ok::<(), SecureError>(())
//! ```
//!
//! ### Tokens
//!
//! ```rust
//! use via_secure::{MaxAge, Payload, TokenCodec};
//!
//! let codec = TokenCodec::new(b"shared_secret_key");
//!
//! let mut payload = Payload::new();
//! payload.insert("user".to_string(), "acct:someone@example.com".into());
//!
//! let token = codec.create(payload, None, Some(MaxAge::Seconds(60)))?;
//! assert_eq!(codec.verify(&token)?["user"], "acct:someone@example.com");
//! # Ok::<(), via_secure::SecureError>(())
//! ```
//!
//! ### Configuration
//!
//! ```rust
//! use via_secure::{ConfigPreset, SecureConfig, ViaUrlSigner};
//!
//! let config = SecureConfig::from(ConfigPreset::Strict);
//! for warning in config.validate() {
//!     eprintln!("{warning}");
//! }
//!
//! let signer = ViaUrlSigner::with_config(b"shared_secret_key", &config);
//! ```
//!
//! ## Time Handling
//!
//! Every codec reads the current time through a [`TimeProviderFn`]. Tests
//! and replays can pin it with [`fixed_time_provider`]:
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use via_secure::{TokenCodec, fixed_time_provider};
//!
//! let now = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
//! let codec = TokenCodec::new(b"secret").with_time_provider(fixed_time_provider(now));
//! ```
//!
//! ## Security Notes
//!
//! - Tokens are only accepted under HS256; any other algorithm is rejected
//! - Signature comparisons are constant time
//! - Errors do not say why a token was rejected beyond its category
//! - [`SecretsCodec`] envelopes are encrypted but **not authenticated**
//! - [`securelink`] digests use MD5 for nginx compatibility only

pub mod secure;
pub mod securelink;

// Re-export commonly used types
pub use secure::{
    ConfigPreset, Cookie, EncryptedEnvelope, Encryption, Expires, ExpiryPolicy, HashedUrlSigner,
    MaxAge, Payload, RandomSecureNonce, RepeatableSecureNonce, Result, SecretKey, SecretsCodec,
    SecureConfig, SecureError, SecureNonce, SecureSecrets, TimeProviderFn, TokenBasedCookie,
    TokenCodec, TokenProvider, UrlSigner, UrlTokenCodec, ViaUrlSigner, ViaUrlTokenCodec,
    fixed_time_provider, year_zero,
};
