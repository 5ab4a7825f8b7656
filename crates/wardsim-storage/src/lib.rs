//! wardsim-storage
//!
//! S3 persistence for cases. Thin object helpers over the AWS S3 SDK plus
//! the [`remote::RemoteStore`] the engine's batch saves write through.

pub mod client;
pub mod error;
pub mod objects;
pub mod remote;
pub mod state;
