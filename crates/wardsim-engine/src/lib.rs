//! wardsim-engine
//!
//! Case orchestration: the lifecycle controller, background persistence,
//! follow-up question polling and generation, the session clock, and the
//! local case cache used for resume.

pub mod cache;
pub mod clock;
pub mod controller;
pub mod error;
pub mod persistence;
pub mod phase;
pub mod poller;
pub mod questions;
pub mod settings;
