use thiserror::Error;

/// Convenience alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, SecureError>;

/// Error types that can occur while creating or checking secure values.
///
/// The variants are deliberately coarse. A caller learns that a token was
/// not acceptable, not whether it was tampered with, expired, or minted for
/// a different resource.
///
/// # Error Categories
///
/// - **Caller Errors**: `InvalidArgument`
/// - **Authentication Errors**: `MissingToken`, `InvalidToken`
/// - **Envelope Errors**: `Decode`
///
/// # Example
///
/// ```rust
/// use via_secure::{SecureError, TokenCodec};
///
/// let codec = TokenCodec::new(b"secret");
///
/// match codec.verify("") {
///     Ok(payload) => println!("Token accepted: {payload:?}"),
///     Err(e) if e.is_invalid_token() => println!("Rejected: {e}"),
///     Err(e) => println!("Other error: {e}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecureError {
    /// The caller supplied an unusable combination of inputs.
    ///
    /// This is always detected before any cryptographic work is done.
    ///
    /// # When This Occurs
    ///
    /// - Neither `expires` nor `max_age` was provided
    /// - An expiry or max age could not be interpreted
    /// - An empty URL was passed to a URL signer
    /// - A cookie expiry carries no timezone
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An expected token was syntactically absent.
    ///
    /// This is a specialization of [`SecureError::InvalidToken`]; use
    /// [`SecureError::is_invalid_token`] to catch both together.
    #[error("Missing token: {0}")]
    MissingToken(String),

    /// A security check on a token failed.
    ///
    /// # When This Occurs
    ///
    /// - The signature does not match the shared secret
    /// - The token names a different signing algorithm
    /// - The token has expired
    /// - The token is bound to a different URL
    /// - A hashed signature does not match the recomputed hash
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// An encrypted envelope could not be decoded.
    ///
    /// The envelope cipher carries no integrity check, so corrupted
    /// ciphertext surfaces here rather than as an authentication failure.
    #[error("Decode error: {0}")]
    Decode(String),
}

impl SecureError {
    /// Returns true for [`SecureError::InvalidToken`] and its
    /// [`SecureError::MissingToken`] specialization.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::InvalidToken(_) | Self::MissingToken(_))
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_token(msg: impl Into<String>) -> Self {
        Self::InvalidToken(msg.into())
    }

    pub(crate) fn missing_token(msg: impl Into<String>) -> Self {
        Self::MissingToken(msg.into())
    }
}
