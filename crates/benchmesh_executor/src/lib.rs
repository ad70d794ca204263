//! BENCHMESH Executor
//!
//! Per-node benchmark execution. [`ExecutorService`] watches cluster-state
//! changes, decides what each change means for the benchmarks assigned to
//! this node, drives the execution backend, and reports node-state
//! transitions back to the master.
//!
//! Cluster events may be redelivered, reordered with respect to replies, or
//! lost. Every backend call is gated by the benchmark's
//! [`InternalExecutorState`], so acting on an event twice is harmless.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod decision;
pub mod error;
pub mod guard;
mod master;
pub mod registry;
pub mod service;
pub mod translate;

pub use config::ExecutorConfig;
pub use decision::{decide, Decision};
pub use error::{ExecutorError, ExecutorResult};
pub use guard::InternalExecutorState;
pub use registry::LocalJobRegistry;
pub use service::ExecutorService;
pub use translate::to_node_state;
