//! Roster Domain Module
//!
//! Typed roster entities and the pure checks every committed roster must pass.
//!
//! ## Submodules
//! - **`types`**: tenant/roster keys, roles, slots, epochs and the `Roster` itself.
//! - **`catalog`**: per-entity price lookup with a default-price fallback.
//! - **`validator`**: formation and budget checks plus the bounded formation cache.

pub mod catalog;
pub mod types;
pub mod validator;
