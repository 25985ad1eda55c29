//! Scope configuration.

use serde::{Deserialize, Serialize};

/// Number of passes a digest may take before giving up.
pub const DEFAULT_TTL: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Maximum digest passes; a digest whose last allowed pass is still
    /// dirty fails with `DigestConvergenceError`.
    pub ttl: usize,
}

impl ScopeConfig {
    pub fn with_ttl(mut self, ttl: usize) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: ScopeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ScopeConfig::default());
        assert_eq!(config.ttl, 10);

        let config: ScopeConfig = serde_json::from_str(r#"{"ttl": 3}"#).unwrap();
        assert_eq!(config, ScopeConfig::default().with_ttl(3));
    }
}
