//! Executor configuration.

use benchmesh_core::{CoreError, CoreResult, NodeId};
use serde::{Deserialize, Serialize};

/// Executor service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Node this executor runs on
    pub node_id: NodeId,
    /// Concurrent benchmark executions allowed on this node
    pub bench_pool_size: usize,
    /// Capacity of the cluster event channel
    pub event_buffer: usize,
}

impl ExecutorConfig {
    /// Create a config for a node with default pool sizes
    #[must_use]
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            bench_pool_size: 1,
            event_buffer: 64,
        }
    }

    /// Set the bench pool size
    #[must_use]
    pub fn with_bench_pool_size(mut self, size: usize) -> Self {
        self.bench_pool_size = size;
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Parse a JSON config; missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed or the config is invalid
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending field
    pub fn validate(&self) -> CoreResult<()> {
        if self.node_id.as_str().is_empty() {
            return Err(CoreError::Validation {
                field: "node_id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.bench_pool_size == 0 {
            return Err(CoreError::Validation {
                field: "bench_pool_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.event_buffer == 0 {
            return Err(CoreError::Validation {
                field: "event_buffer".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new(NodeId::generate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::new(NodeId::from("n1"));
        assert_eq!(config.bench_pool_size, 1);
        assert_eq!(config.event_buffer, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = ExecutorConfig::from_json(r#"{"node_id": "n7", "bench_pool_size": 3}"#).unwrap();
        assert_eq!(config.node_id, NodeId::from("n7"));
        assert_eq!(config.bench_pool_size, 3);
        assert_eq!(config.event_buffer, 64);
    }

    #[test]
    fn test_from_json_rejects_zero_pool() {
        let err = ExecutorConfig::from_json(r#"{"node_id": "n7", "bench_pool_size": 0}"#).unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "bench_pool_size"));
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            ExecutorConfig::from_json("{node_id"),
            Err(CoreError::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn test_empty_node_id() {
        let config = ExecutorConfig::new(NodeId::from(""));
        assert!(config.validate().is_err());
    }
}
