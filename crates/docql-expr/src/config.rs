//! Engine settings

use docql_diagnostics::{DocqlError, DQL0402};
use serde::{Deserialize, Serialize};

/// Tunables shared by every evaluation in an execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum static IN-list length for which a hash table is built
    pub inlist_hash_threshold: usize,
    /// Deepest expression nesting evaluated before giving up
    pub max_recursion_depth: usize,
    /// Buffers each pool keeps for reuse
    pub pool_capacity: usize,
    /// Cache compiled LIKE patterns per context
    pub like_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inlist_hash_threshold: 16,
            max_recursion_depth: 256,
            pool_capacity: 64,
            like_cache: true,
        }
    }
}

impl EngineConfig {
    /// Parse settings from JSON; absent fields keep their defaults
    pub fn from_json(text: &str) -> docql_diagnostics::Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| DocqlError::config(DQL0402, format!("Invalid engine configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> docql_diagnostics::Result<()> {
        if self.inlist_hash_threshold == 0 {
            return Err(DocqlError::config(
                DQL0402,
                "inlist_hash_threshold must be at least 1",
            ));
        }
        if self.max_recursion_depth == 0 {
            return Err(DocqlError::config(
                DQL0402,
                "max_recursion_depth must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{"inlist_hash_threshold": 4}"#).unwrap();
        assert_eq!(config.inlist_hash_threshold, 4);
        assert_eq!(config.max_recursion_depth, 256);
        assert!(config.like_cache);
    }

    #[test]
    fn test_invalid_config() {
        let err = EngineConfig::from_json(r#"{"max_recursion_depth": 0}"#).unwrap_err();
        assert_eq!(err.code(), DQL0402);
        assert!(EngineConfig::from_json("[").is_err());
    }
}
