//! Progress reporting module
//!
//! Provides live item and byte counters for copy runs.

mod reporter;

pub use reporter::*;
