//! Support pieces shared across the engine.
//!
//! - cli: command line interface for the demo binary.
//! - pool: the worker pool every parallel phase fans out on.
//! - shared: raw shared slice view for disjoint-write phases.
pub mod cli;
pub mod pool;
pub(crate) mod shared;
