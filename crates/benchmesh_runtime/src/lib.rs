//! BENCHMESH Runtime
//!
//! Execution backend contract and the thread pools backend calls run on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod pool;

pub use backend::{
    BackendError, BenchmarkDefinition, BenchmarkStartResponse, BenchmarkState, BenchmarkStatus,
    ExecutionBackend,
};
pub use pool::{PoolError, ThreadPools};
