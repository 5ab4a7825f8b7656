//! wardsim-core
//!
//! Pure domain types, remote-store key conventions, and validation of JSON
//! that crosses a trust boundary. This is the shared vocabulary of the simulator
//! and has no AWS SDK dependency.

pub mod error;
pub mod models;
pub mod store_keys;
pub mod validate;
