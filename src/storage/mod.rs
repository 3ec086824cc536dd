//! Storage Module
//!
//! Everything between the engine and the backing store.
//!
//! ## Core Concepts
//! - **Routing**: `PartitionRouter` hashes a tenant key to one of a fixed number of
//!   partitions, and each shard owns a contiguous range of partitions.
//! - **Contract**: `RosterStore` is the narrow async interface the engine writes
//!   through. Every call carries the route so the backend can pick a physical node.
//! - **Backend**: `InMemoryRosterStore` keeps one table set per shard, with
//!   latency and fault injection for benchmarks and tests.

pub mod memory;
pub mod partitioner;
pub mod protocol;

#[cfg(test)]
mod tests;
