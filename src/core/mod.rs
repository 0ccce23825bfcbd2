//! Core copy engine module
//!
//! Provides the worker pool that drains an item stream into a destination
//! storage under a continue-or-abort failure policy.

mod copier;

pub use copier::*;
