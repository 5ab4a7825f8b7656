//! wardsim-ai
//!
//! The generative service contract and everything that wraps a call to it:
//! context trimming, retry with backoff, and the examination/investigation
//! fan-out.

pub mod bedrock;
pub mod context;
pub mod error;
pub mod operations;
pub mod results;
pub mod retry;
pub mod service;
