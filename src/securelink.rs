//! Link digests compatible with nginx's `secure_link_md5`.
//!
//! See <https://nginx.org/en/docs/http/ngx_http_secure_link_module.html>.
//! The digest carries no expiry of its own; callers put the expiry into the
//! URL they hash.

use base64::Engine;
use md5::{Digest, Md5};
use subtle::ConstantTimeEq;

/// Computes the link digest for `url` under `secret`.
///
/// The value is `base64url(MD5(url + " " + secret))` without padding, the
/// same as:
///
/// ```text
/// echo -n '/location/1609455600/ SECRET' | openssl md5 -binary | openssl base64 | tr +/ -_ | tr -d =
/// ```
///
/// # Example
///
/// ```rust
/// use via_secure::securelink::digest;
///
/// assert_eq!(digest("SECRET", "/location/1609455600/"), "nylQvIaceqvrj67dUgXQ6A");
/// ```
pub fn digest(secret: &str, url: &str) -> String {
    let hash = Md5::digest(format!("{url} {secret}").as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Compares two digests in constant time.
///
/// The running time does not depend on where the first differing byte is.
/// Inputs of different lengths compare unequal.
pub fn compare_digest(a: impl AsRef<[u8]>, b: impl AsRef<[u8]>) -> bool {
    a.as_ref().ct_eq(b.as_ref()).into()
}
