//! stratum Storage
//!
//! The persistence interface the lifecycle service and evaluator consume,
//! plus an in-memory implementation whose reads are snapshot-consistent.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod store;

pub use memory::MemoryPolicyStore;
pub use store::{ActiveVersion, PolicyStore, StoreConfig, StoreStats};
