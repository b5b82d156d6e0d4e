use crate::secure::expiry::DEFAULT_DIVISIONS;
use chrono::TimeDelta;

/// Name of the query parameter carrying a Via signature.
pub const VIA_TOKEN_PARAM: &str = "via.sec";

/// Prefix of every proxy-internal query parameter.
pub const VIA_NAMESPACE: &str = "via.";

/// Predefined configuration presets for common use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Production-ready configuration.
    ///
    /// - Via max age: 1 hour, split into 2 buckets
    /// - Cookies: `SameSite=None; Secure`
    Production,

    /// Development-friendly configuration.
    ///
    /// Same windows as production, but cookies are not marked `Secure` so
    /// they survive plain HTTP on localhost.
    Development,

    /// Tighter windows for sensitive deployments.
    ///
    /// - Via max age: 15 minutes, split into 3 buckets
    Strict,
}

/// Settings shared by the Via-specific signers and the cookie codec.
///
/// The defaults are the values the proxy and its clients agree on. Signers
/// that must interoperate have to be built from the same configuration and
/// the same secret.
///
/// # Example
///
/// ```rust
/// use via_secure::{ConfigPreset, SecureConfig, ViaUrlSigner};
///
/// let config = SecureConfig::from(ConfigPreset::Strict);
/// assert!(config.validate().is_empty());
///
/// let signer = ViaUrlSigner::with_config(b"secret", &config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureConfig {
    /// Longest lifetime of a Via signature.
    pub via_max_age: TimeDelta,
    /// Number of buckets `via_max_age` is quantized into.
    pub quantize_divisions: u32,
    /// Query parameter holding the Via signature.
    pub via_token_param: String,
    /// Prefix of query parameters ignored when canonicalizing Via URLs.
    pub via_namespace: String,
    /// Whether cookies are marked `SameSite=None; Secure`.
    pub cookie_secure: bool,
}

impl Default for SecureConfig {
    fn default() -> Self {
        Self {
            via_max_age: TimeDelta::hours(1),
            quantize_divisions: DEFAULT_DIVISIONS,
            via_token_param: VIA_TOKEN_PARAM.to_string(),
            via_namespace: VIA_NAMESPACE.to_string(),
            cookie_secure: true,
        }
    }
}

impl SecureConfig {
    /// Validates the configuration and returns any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.via_max_age <= TimeDelta::zero() {
            warnings.push("Via max age must be positive".to_string());
        } else if self.via_max_age < TimeDelta::minutes(5) {
            warnings.push(
                "Very short Via max age (< 5 minutes) makes signatures roll over often"
                    .to_string(),
            );
        } else if self.via_max_age > TimeDelta::days(1) {
            warnings.push("Long Via max age (> 1 day) increases exposure".to_string());
        }

        if self.quantize_divisions == 0 {
            warnings.push("Quantize divisions must be at least 1".to_string());
        } else if self.quantize_divisions == 1 {
            warnings.push(
                "A single division can produce signatures that expire almost immediately"
                    .to_string(),
            );
        }

        if !self.via_token_param.starts_with(&self.via_namespace) {
            warnings.push(
                "Via token parameter is outside the Via namespace and will be signed into URLs"
                    .to_string(),
            );
        }

        if !self.cookie_secure {
            warnings.push("Cookies will not be marked Secure".to_string());
        }

        warnings
    }

    /// Returns a summary of the current configuration.
    pub fn summary(&self) -> String {
        format!(
            "SecureConfig {{ Via max age: {}s, Divisions: {}, Token param: {}, Namespace: {}, Secure cookies: {} }}",
            self.via_max_age.num_seconds(),
            self.quantize_divisions,
            self.via_token_param,
            self.via_namespace,
            self.cookie_secure,
        )
    }
}

impl From<ConfigPreset> for SecureConfig {
    fn from(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Production => Self::default(),
            ConfigPreset::Development => Self {
                cookie_secure: false,
                ..Self::default()
            },
            ConfigPreset::Strict => Self {
                via_max_age: TimeDelta::minutes(15),
                quantize_divisions: 3,
                ..Self::default()
            },
        }
    }
}
