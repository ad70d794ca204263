//! BENCHMESH Core Types
//!
//! Identifiers, lifecycle vocabularies and errors shared by every
//! BENCHMESH crate. No I/O lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod id;
pub mod state;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use id::{JobId, NodeId};
pub use state::{NodeState, Phase};
