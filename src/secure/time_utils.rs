//! Time utilities shared by the codecs.
//!
//! Every codec reads "now" through a [`TimeProviderFn`] so that a whole
//! signer stack can be driven from one clock in tests.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A function that provides the current time.
pub type TimeProviderFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The default time provider, backed by the system clock.
pub(crate) fn system_time_provider() -> TimeProviderFn {
    Arc::new(Utc::now)
}

/// Builds a time provider that always returns `at`.
///
/// # Example
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use via_secure::fixed_time_provider;
///
/// let at = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
/// let provider = fixed_time_provider(at);
/// assert_eq!(provider(), at);
/// ```
pub fn fixed_time_provider(at: DateTime<Utc>) -> TimeProviderFn {
    Arc::new(move || at)
}

/// Whole Unix seconds for `at`, the resolution used by the `exp` claim.
pub(crate) fn unix_seconds(at: &DateTime<Utc>) -> i64 {
    at.timestamp()
}
