//! Sharded Roster Transaction Engine
//!
//! This library crate holds the engine that routes tenants to storage shards,
//! validates and commits team roster changes, and throttles the operations
//! sent to the backend. The benchmark binary (`main.rs`) drives it end to end.
//!
//! ## Modules
//! - **`storage`**: the partition router (FNV-1a over the tenant key, contiguous
//!   shard ranges), the async `RosterStore` contract, and an in-memory backend.
//! - **`roster`**: typed roster entities, the price catalog, and the formation
//!   and budget checks.
//! - **`transfer`**: the transfer state machine with its same-gameset and
//!   cross-gameset commit paths, per-roster locking, and read projections.
//! - **`executor`**: the bounded concurrency controller with its circuit breaker.
//! - **`metrics`**: an injected latency and rejection collector.
//! - **`config`**: engine configuration with defaults and validation.
//! - **`fixtures`**: player catalog and team/transfer generators for benchmarks.

pub mod config;
pub mod executor;
pub mod fixtures;
pub mod metrics;
pub mod roster;
pub mod storage;
pub mod transfer;
