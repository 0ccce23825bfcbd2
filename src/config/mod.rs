//! Configuration module for StoreCopy
//!
//! Provides CLI argument parsing and the immutable run configuration.

mod settings;

pub use settings::*;
