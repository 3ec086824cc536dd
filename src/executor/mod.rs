//! Concurrency Control Module
//!
//! Bounds how many storage-bound operations are in flight against the backend.
//! Nothing here spawns OS threads: operations are tokio tasks, and the controller
//! only decides when each one may start.
//!
//! ## Architecture Overview
//! 1. **Admission**: `execute` checks the circuit breaker, then the wait queue.
//!    Either check can reject the call before its operation is ever invoked.
//! 2. **Queueing**: admitted operations wait in a FIFO queue.
//! 3. **Dispatch**: whenever a slot frees up, the head of the queue is spawned.
//! 4. **Health**: every failure counts toward the breaker; once the threshold is
//!    reached the controller fails fast until the cool-down has passed.
//!
//! ## Submodules
//! - **`controller`**: the queue, the dispatch loop and the breaker state machine.
//! - **`types`**: error taxonomy, breaker state and the metrics snapshot.

pub mod controller;
pub mod types;

#[cfg(test)]
mod tests;
