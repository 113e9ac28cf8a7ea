//! Scope configuration.

use serde::Deserialize;

use crate::error::ConfigError;

/// Number of passes a single digest may run before giving up.
pub const DEFAULT_TTL: usize = 10;

/// Tunables for a [`Scope`](crate::Scope).
///
/// ```rust
/// use vigil_core::ScopeConfig;
///
/// let config = ScopeConfig::from_json(r#"{ "ttl": 20 }"#).unwrap();
/// assert_eq!(config.ttl, 20);
/// assert_eq!(ScopeConfig::default().ttl, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeConfig {
    /// Pass budget for one `digest()` call.
    pub ttl: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

impl ScopeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: usize) -> Self {
        self.ttl = ttl;
        self
    }

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl == 0 {
            return Err(ConfigError::ZeroTtl);
        }
        Ok(())
    }
}
