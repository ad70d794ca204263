//! BENCHMESH Cluster
//!
//! Replicated benchmark metadata, membership snapshots, cluster change
//! events, and the messaging contract between workers and the master.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod membership;
pub mod metadata;
pub mod state;
pub mod transport;

pub use membership::{Member, MemberState, Membership, BENCH_CAPABILITY};
pub use metadata::{BenchmarkMetadata, JobEntry};
pub use state::{ClusterChangedEvent, ClusterState};
pub use transport::{
    actions, DefinitionRequest, DefinitionResponse, NodeStateUpdate, RemoteError, RequestHandler,
    StatusRequest, StatusResponse, Transport, TransportError, TransportRequest, TransportResponse,
};
