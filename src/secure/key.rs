use std::fmt;

/// The shared secret handed to every codec at construction.
///
/// Codecs that must interoperate are built from the same secret. The bytes
/// are never printed: the `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Creates a new `SecretKey` by copying the provided bytes.
    pub fn new(secret: &[u8]) -> Self {
        Self(secret.to_vec())
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(<{} bytes redacted>)", self.0.len())
    }
}

impl From<&[u8]> for SecretKey {
    fn from(secret: &[u8]) -> Self {
        Self::new(secret)
    }
}

impl<const N: usize> From<&[u8; N]> for SecretKey {
    fn from(secret: &[u8; N]) -> Self {
        Self::new(secret)
    }
}

impl From<&str> for SecretKey {
    fn from(secret: &str) -> Self {
        Self::new(secret.as_bytes())
    }
}

impl From<Vec<u8>> for SecretKey {
    fn from(secret: Vec<u8>) -> Self {
        Self(secret)
    }
}
