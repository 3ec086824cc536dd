//! Transfer Module
//!
//! The roster state machine: creating teams, swapping entities in and out,
//! and the read projections built on the committed state.
//!
//! ## Submodules
//! - **`engine`**: `TransferEngine`, preconditions and commit strategies.
//! - **`locks`**: per-roster async mutexes serializing mutations of one team.
//! - **`types`**: requests, outcomes, the error taxonomy and audit records.

pub mod engine;
pub mod locks;
pub mod types;
