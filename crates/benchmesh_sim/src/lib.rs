//! BENCHMESH Deterministic Simulation
//!
//! In-memory cluster pieces for exercising executors without real nodes:
//! a seeded lossy network, a scripted backend, a scripted master, and a
//! lifecycle harness. Runs are reproducible from a seed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod harness;
pub mod master;
pub mod network;
pub mod seed;

pub use backend::{BackendCall, BackendOp, SimBackend};
pub use harness::{SimConfig, SimError, SimHarness, SimNode, SimReport};
pub use master::SimMaster;
pub use network::{DropReason, MessageRecord, NetworkCondition, SimNetwork, SimTransport};
pub use seed::{SeedSource, SimSeed};
