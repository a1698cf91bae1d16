//! Engine configuration

use serde::{Deserialize, Serialize};

/// Default number of re-resolutions after a write conflict
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Tunables for the transaction engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many times a conflicting commit is re-resolved against fresh state
    /// before failing with a concurrent-modification error
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

impl EngineConfig {
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());

        let config: EngineConfig = serde_json::from_str(r#"{"max_conflict_retries": 0}"#).unwrap();
        assert_eq!(config.max_conflict_retries, 0);
    }
}
