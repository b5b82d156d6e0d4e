// Core primitives
mod config;
mod error;
mod expiry;
mod key;
mod time_utils;

// Tokens and signed URLs
mod query;
mod token;
mod url_signer;
mod url_token;

// Cookies, nonces and envelopes
mod cookie;
mod nonce;
mod secrets;

// Core exports
pub use config::{ConfigPreset, SecureConfig, VIA_NAMESPACE, VIA_TOKEN_PARAM};
pub use error::{Result, SecureError};
pub use expiry::{
    DEFAULT_DIVISIONS, Expires, ExpiryPolicy, MaxAge, YEAR_ZERO_TIMESTAMP, year_zero,
};
pub use key::SecretKey;
pub use time_utils::{TimeProviderFn, fixed_time_provider};

// Token exports
pub use token::{EXP_CLAIM, Payload, TOKEN_ALGORITHM, TokenCodec, TokenProvider};
pub use url_signer::{HashedUrlSigner, UrlSigner, ViaUrlSigner};
pub use url_token::{URL_CLAIM, UrlTokenCodec, ViaUrlTokenCodec};

// Cookie, nonce and envelope exports
pub use cookie::{Cookie, Header, SET_COOKIE, TokenBasedCookie};
pub use nonce::{RandomSecureNonce, RepeatableSecureNonce, SaltGeneratorFn, SecureNonce};
pub use secrets::{BLOCK_SIZE, EncryptedEnvelope, Encryption, SecretsCodec, SecureSecrets};
