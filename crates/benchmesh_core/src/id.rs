//! Identifiers for BENCHMESH entities.
//!
//! Jobs and nodes are addressed by opaque strings assigned by the
//! coordinator; both serialize as plain strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job identifier - identifies a benchmark tracked in cluster metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Create a JobId from a coordinator-assigned name
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random JobId
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Node identifier - identifies a cluster member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from a name
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a new random NodeId
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("node-{}", Uuid::new_v4().simple()))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(JobId::generate(), JobId::generate());
        assert_ne!(NodeId::generate(), NodeId::generate());
    }

    #[test]
    fn test_id_display() {
        let id = JobId::new("bench-1");
        assert_eq!(format!("{}", id), "bench-1");
        assert!(NodeId::generate().to_string().starts_with("node-"));
    }

    #[test]
    fn test_id_serializes_as_string() {
        let id = NodeId::from("n1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"n1\"");
        let back: NodeId = serde_json::from_str("\"n1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_id_ord() {
        let mut ids = vec![JobId::from("b"), JobId::from("a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
