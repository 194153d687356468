//! TTL Layer Configuration
//!
//! Tunable parameters for the expiration layer. The configuration is owned
//! by each [`TtlStore`](crate::ttl::TtlStore) and handed to its index codec,
//! so several TTL-wrapped stores can live in one process with different
//! namespaces.

use crate::error::{Result, TtlError};
use std::time::Duration;

/// Default interval between expiry sweeps.
pub const DEFAULT_CHECK_FREQUENCY: Duration = Duration::from_secs(10);

/// Default namespace for expiration metadata keys.
pub const DEFAULT_NAMESPACE: &str = "ttl";

/// Default separator used when encoding metadata keys.
pub const DEFAULT_SEPARATOR: &str = "!";

/// Configuration for a TTL-wrapped store.
#[derive(Debug, Clone)]
pub struct TtlConfig {
    /// Namespace that keeps expiration metadata apart from user keys.
    pub namespace: String,

    /// Separator token used between key-encoding segments.
    pub separator: String,

    /// Interval between expiry sweeps (default: 10s).
    pub check_frequency: Duration,

    /// TTL applied to writes that don't specify one (default: none).
    pub default_ttl: Option<Duration>,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
            check_frequency: DEFAULT_CHECK_FREQUENCY,
            default_ttl: None,
        }
    }
}

impl TtlConfig {
    /// Create a new config with a custom namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Set the separator token.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Set the sweep interval.
    pub fn with_check_frequency(mut self, frequency: Duration) -> Self {
        self.check_frequency = frequency;
        self
    }

    /// Set a default TTL for writes without an explicit one.
    ///
    /// A zero duration disables the default.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    /// Checks that the configuration can produce unambiguous metadata keys.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            return Err(TtlError::Config("namespace must not be empty".into()));
        }
        if self.separator.is_empty() {
            return Err(TtlError::Config("separator must not be empty".into()));
        }
        if self.namespace.contains(&self.separator) {
            return Err(TtlError::Config(format!(
                "namespace {:?} must not contain the separator {:?}",
                self.namespace, self.separator
            )));
        }
        if self.check_frequency.is_zero() {
            return Err(TtlError::Config(
                "check frequency must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TtlConfig::default();
        assert_eq!(config.namespace, "ttl");
        assert_eq!(config.separator, "!");
        assert_eq!(config.check_frequency, Duration::from_secs(10));
        assert!(config.default_ttl.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_default_ttl_disables() {
        let config = TtlConfig::default().with_default_ttl(Duration::ZERO);
        assert!(config.default_ttl.is_none());

        let config = TtlConfig::default().with_default_ttl(Duration::from_secs(5));
        assert_eq!(config.default_ttl, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_validate_rejects_bad_encoding() {
        assert!(TtlConfig::new("").validate().is_err());
        assert!(TtlConfig::default().with_separator("").validate().is_err());
        assert!(TtlConfig::new("a!b").validate().is_err());
        assert!(TtlConfig::default()
            .with_check_frequency(Duration::ZERO)
            .validate()
            .is_err());
    }
}
