//! Expiry resolution and quantization.
//!
//! Tokens carry an absolute expiry. Callers either hand one in directly or
//! give a maximum age relative to now. The quantized mode snaps the expiry to
//! one of `divisions` buckets inside the max-age window, so every request
//! issued within one bucket produces an identical expiry (and, for the hashed
//! signers, an identical signature).

use crate::secure::error::{Result, SecureError};
use crate::secure::time_utils::{TimeProviderFn, system_time_provider};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use std::fmt;

/// Unix timestamp of `2000-01-01T00:00:00Z`, the origin of the quantization grid.
pub const YEAR_ZERO_TIMESTAMP: i64 = 946_684_800;

/// Number of buckets a max-age window is split into when not specified.
pub const DEFAULT_DIVISIONS: u32 = 2;

/// The fixed origin that quantized expiries are measured from.
pub fn year_zero() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(YEAR_ZERO_TIMESTAMP)
}

/// An absolute expiry as supplied by a caller.
///
/// `Naive` values are read as UTC by the token codecs but rejected by
/// [`Cookie`](crate::Cookie), where an ambiguous wall-clock time must not be
/// guessed at. `Text` must be RFC 3339.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expires {
    At(DateTime<Utc>),
    Offset(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
    Text(String),
}

impl Expires {
    /// Interprets this value as a UTC moment, reading naive values as UTC.
    pub(crate) fn to_utc(&self) -> Result<DateTime<Utc>> {
        match self {
            Self::Naive(naive) => Ok(naive.and_utc()),
            other => other.to_utc_strict(),
        }
    }

    /// Interprets this value as a UTC moment, rejecting naive values.
    pub(crate) fn to_utc_strict(&self) -> Result<DateTime<Utc>> {
        match self {
            Self::At(at) => Ok(*at),
            Self::Offset(at) => Ok(at.with_timezone(&Utc)),
            Self::Naive(_) => Err(SecureError::invalid_argument(
                "expires must carry timezone information",
            )),
            Self::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                .map(|at| at.with_timezone(&Utc))
                .map_err(|e| {
                    SecureError::invalid_argument(format!("expires is not a valid date: {e}"))
                }),
        }
    }
}

impl From<DateTime<Utc>> for Expires {
    fn from(at: DateTime<Utc>) -> Self {
        Self::At(at)
    }
}

impl From<DateTime<FixedOffset>> for Expires {
    fn from(at: DateTime<FixedOffset>) -> Self {
        Self::Offset(at)
    }
}

impl From<NaiveDateTime> for Expires {
    fn from(at: NaiveDateTime) -> Self {
        Self::Naive(at)
    }
}

impl From<&str> for Expires {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A relative expiry, measured from now.
///
/// `Text` must hold a whole number of seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaxAge {
    Seconds(i64),
    Span(TimeDelta),
    Text(String),
}

impl MaxAge {
    pub(crate) fn to_delta(&self) -> Result<TimeDelta> {
        match self {
            Self::Seconds(seconds) => TimeDelta::try_seconds(*seconds).ok_or_else(|| {
                SecureError::invalid_argument(format!("max_age out of range: {seconds}"))
            }),
            Self::Span(span) => Ok(*span),
            Self::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| {
                    SecureError::invalid_argument(format!("max_age is not a duration: {text:?}"))
                })
                .and_then(|seconds| Self::Seconds(seconds).to_delta()),
        }
    }

    /// Whole seconds, as written into a `Max-Age` cookie attribute.
    pub(crate) fn to_seconds(&self) -> Result<i64> {
        Ok(self.to_delta()?.num_seconds())
    }
}

impl From<i64> for MaxAge {
    fn from(seconds: i64) -> Self {
        Self::Seconds(seconds)
    }
}

impl From<TimeDelta> for MaxAge {
    fn from(span: TimeDelta) -> Self {
        Self::Span(span)
    }
}

impl From<std::time::Duration> for MaxAge {
    fn from(duration: std::time::Duration) -> Self {
        // Durations beyond TimeDelta's range are clamped; they are rejected
        // downstream as out of range anyway.
        Self::Span(TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX))
    }
}

impl From<&str> for MaxAge {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Computes absolute expiry timestamps against a configurable clock.
///
/// # Example
///
/// ```rust
/// use via_secure::{ExpiryPolicy, MaxAge};
///
/// let policy = ExpiryPolicy::new();
/// let expires = policy.quantized(&MaxAge::Seconds(99), 3)?;
///
/// let since_zero = expires - via_secure::year_zero();
/// assert_eq!(since_zero.num_milliseconds() % 33_000, 0);
/// # Ok::<(), via_secure::SecureError>(())
/// ```
#[derive(Clone)]
pub struct ExpiryPolicy {
    time_provider: TimeProviderFn,
}

impl ExpiryPolicy {
    /// Creates a policy backed by the system clock.
    pub fn new() -> Self {
        Self {
            time_provider: system_time_provider(),
        }
    }

    /// Sets a custom time provider function.
    pub fn with_time_provider(mut self, provider: TimeProviderFn) -> Self {
        self.time_provider = provider;
        self
    }

    /// The current time according to this policy's clock.
    pub fn now(&self) -> DateTime<Utc> {
        (self.time_provider)()
    }

    /// Resolves an absolute expiry from either an explicit `expires` or a
    /// `max_age` offset from now.
    ///
    /// When both are supplied `expires` wins.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidArgument`] if neither is supplied or the
    /// supplied value cannot be interpreted.
    pub fn resolve(
        &self,
        expires: Option<&Expires>,
        max_age: Option<&MaxAge>,
    ) -> Result<DateTime<Utc>> {
        if let Some(expires) = expires {
            return expires.to_utc();
        }

        let Some(max_age) = max_age else {
            return Err(SecureError::invalid_argument(
                "you must specify either expires or max_age",
            ));
        };

        self.now()
            .checked_add_signed(max_age.to_delta()?)
            .ok_or_else(|| SecureError::invalid_argument("max_age puts expiry out of range"))
    }

    /// Computes an expiry quantized into `divisions` buckets of `max_age`.
    ///
    /// The result is `now + max_age` rounded down onto a grid of width
    /// `max_age / divisions` anchored at [`year_zero`]. It is therefore at
    /// most `max_age` and at least `max_age * (divisions - 1) / divisions`
    /// in the future.
    ///
    /// # Errors
    ///
    /// Returns [`SecureError::InvalidArgument`] if `max_age` is not a positive
    /// duration or `divisions` is zero.
    pub fn quantized(&self, max_age: &MaxAge, divisions: u32) -> Result<DateTime<Utc>> {
        let span = max_age.to_delta()?;
        if span <= TimeDelta::zero() {
            return Err(SecureError::invalid_argument("max_age must be positive"));
        }
        if divisions == 0 {
            return Err(SecureError::invalid_argument("divisions must be positive"));
        }

        let quantum_ms = span.num_milliseconds() / i64::from(divisions);
        if quantum_ms <= 0 {
            return Err(SecureError::invalid_argument(
                "max_age is too short for the requested divisions",
            ));
        }

        let target = self
            .now()
            .checked_add_signed(span)
            .ok_or_else(|| SecureError::invalid_argument("max_age puts expiry out of range"))?;

        let zero_ms = YEAR_ZERO_TIMESTAMP * 1000;
        let buckets = (target.timestamp_millis() - zero_ms).div_euclid(quantum_ms);

        DateTime::from_timestamp_millis(zero_ms + buckets * quantum_ms)
            .ok_or_else(|| SecureError::invalid_argument("quantized expiry out of range"))
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExpiryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryPolicy").finish_non_exhaustive()
    }
}
