//! Request/response messaging between workers and the coordinator.

use async_trait::async_trait;
use benchmesh_core::{CoreResult, JobId, NodeId, NodeState};
use benchmesh_runtime::{BenchmarkDefinition, BenchmarkStartResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Action names used on the wire
pub mod actions {
    /// Worker asks the master for a benchmark definition
    pub const DEFINITION: &str = "benchmark/definition";
    /// Worker reports a node-state transition to the master
    pub const NODE_STATE: &str = "benchmark/node-state";
    /// Master pulls a benchmark's status from a worker
    pub const NODE_STATUS: &str = "benchmark/node/status";
}

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Response of the wrong kind
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Node unavailable
    #[error("Node unavailable: {0}")]
    NodeUnavailable(NodeId),

    /// No master is currently elected
    #[error("No master node elected")]
    NoMaster,

    /// Target has no handler for the action
    #[error("No handler registered for {0}")]
    NoHandler(String),

    /// Handler on the remote node failed
    #[error("Remote failure: {0}")]
    Remote(#[from] RemoteError),
}

/// Error produced by a request handler and sent back to the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RemoteError {
    /// Receiver is in a state the protocol does not allow
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Receiver could not serve the request
    #[error("Request failed: {0}")]
    Failed(String),
}

/// Definition fetch payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRequest {
    /// Benchmark to fetch
    pub job_id: JobId,
    /// Requesting worker
    pub node_id: NodeId,
}

/// Definition fetch reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionResponse {
    /// Benchmark fetched
    pub job_id: JobId,
    /// Worker the definition was sent to
    pub node_id: NodeId,
    /// Benchmark definition
    pub definition: BenchmarkDefinition,
}

/// Node-state report payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStateUpdate {
    /// Benchmark reported on
    pub job_id: JobId,
    /// Reporting worker
    pub node_id: NodeId,
    /// New state of the worker
    pub state: NodeState,
}

/// Status pull payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    /// Benchmark to report on
    pub job_id: JobId,
}

/// Status pull reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Benchmark reported on
    pub job_id: JobId,
    /// Reporting worker
    pub node_id: NodeId,
    /// Cached final or live result
    pub response: BenchmarkStartResponse,
}

/// Request sent over the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload")]
pub enum TransportRequest {
    /// Fetch a definition
    #[serde(rename = "benchmark/definition")]
    Definition(DefinitionRequest),
    /// Report a node-state transition
    #[serde(rename = "benchmark/node-state")]
    NodeState(NodeStateUpdate),
    /// Pull status
    #[serde(rename = "benchmark/node/status")]
    Status(StatusRequest),
}

impl TransportRequest {
    /// Action this request is dispatched under
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Definition(_) => actions::DEFINITION,
            Self::NodeState(_) => actions::NODE_STATE,
            Self::Status(_) => actions::NODE_STATUS,
        }
    }

    /// Encode for the wire
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a request
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Reply sent over the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum TransportResponse {
    /// Definition fetched
    Definition(DefinitionResponse),
    /// Empty acknowledgement
    Ack,
    /// Status report
    Status(StatusResponse),
}

impl TransportResponse {
    /// Encode for the wire
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are not a response
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Unwrap a definition reply
    ///
    /// # Errors
    ///
    /// Returns error if this is a different kind of reply
    pub fn into_definition(self) -> Result<DefinitionResponse, TransportError> {
        match self {
            Self::Definition(response) => Ok(response),
            other => Err(TransportError::InvalidResponse(format!(
                "expected definition, got {other:?}"
            ))),
        }
    }

    /// Unwrap an acknowledgement
    ///
    /// # Errors
    ///
    /// Returns error if this is a different kind of reply
    pub fn into_ack(self) -> Result<(), TransportError> {
        match self {
            Self::Ack => Ok(()),
            other => Err(TransportError::InvalidResponse(format!(
                "expected ack, got {other:?}"
            ))),
        }
    }

    /// Unwrap a status reply
    ///
    /// # Errors
    ///
    /// Returns error if this is a different kind of reply
    pub fn into_status(self) -> Result<StatusResponse, TransportError> {
        match self {
            Self::Status(response) => Ok(response),
            other => Err(TransportError::InvalidResponse(format!(
                "expected status, got {other:?}"
            ))),
        }
    }
}

/// Handler for inbound requests of one action
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Serve a request
    ///
    /// # Errors
    ///
    /// Returns a remote error that is relayed to the caller
    async fn handle(&self, request: TransportRequest) -> Result<TransportResponse, RemoteError>;
}

/// Point-to-point request/response messaging.
///
/// Delivery is reliable when it succeeds; a failed round trip surfaces as a
/// [`TransportError`] and is never retried by the transport itself.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the reply
    ///
    /// # Errors
    ///
    /// Returns error if the round trip does not complete
    async fn send_request(
        &self,
        target: &NodeId,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError>;

    /// Register the handler serving `action` on this node
    fn register_handler(&self, action: &'static str, handler: Arc<dyn RequestHandler>);
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchmesh_runtime::BenchmarkState;

    #[test]
    fn test_request_action() {
        let request = TransportRequest::Status(StatusRequest {
            job_id: JobId::from("b1"),
        });
        assert_eq!(request.action(), actions::NODE_STATUS);

        let request = TransportRequest::NodeState(NodeStateUpdate {
            job_id: JobId::from("b1"),
            node_id: NodeId::from("n1"),
            state: NodeState::Ready,
        });
        assert_eq!(request.action(), actions::NODE_STATE);
    }

    #[test]
    fn test_request_wire_format_uses_action_name() {
        let request = TransportRequest::Definition(DefinitionRequest {
            job_id: JobId::from("b1"),
            node_id: NodeId::from("n1"),
        });
        let bytes = request.encode().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["action"], actions::DEFINITION);
        assert_eq!(TransportRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(TransportRequest::decode(b"\xff\x00").is_err());
        assert!(TransportResponse::decode(b"{}").is_err());
    }

    #[test]
    fn test_response_unwrap() {
        assert_eq!(TransportResponse::Ack.into_ack(), Ok(()));
        assert!(TransportResponse::Ack.into_definition().is_err());

        let status = StatusResponse {
            job_id: JobId::from("b1"),
            node_id: NodeId::from("n1"),
            response: BenchmarkStartResponse::new(JobId::from("b1"), BenchmarkState::Running),
        };
        let response = TransportResponse::Status(status.clone());
        assert_eq!(response.into_status().unwrap(), status);
    }

    #[test]
    fn test_remote_error_converts() {
        let err: TransportError = RemoteError::IllegalState("missing".to_string()).into();
        assert!(err.to_string().contains("missing"));
    }
}
