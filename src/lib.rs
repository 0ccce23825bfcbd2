//! # StoreCopy - parallel copy across storage backends
//!
//! StoreCopy copies a set of files or objects from one storage backend to
//! another with a bounded pool of workers. The local filesystem, S3-compatible
//! object stores and Google Cloud Storage all sit behind the same
//! [`Storage`](storage::Storage) capability, so the copy engine never knows
//! which backend it is reading from or writing to.
//!
//! ## Features
//!
//! - **Lazy enumeration**: producers stream items while workers are already copying
//! - **Bounded fan-out**: exactly N workers pull from one shared queue
//! - **Failure policy**: continue past failed items, or stop at the first one
//! - **Prefix mapping**: an item's path below its source root is reproduced
//!   below the destination's root or key prefix
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use storecopy::core::{CopyEngine, CopyOptions};
//! use storecopy::storage::{LocalStorage, S3Config, S3Storage};
//!
//! # async fn run() -> storecopy::Result<()> {
//! let config = S3Config {
//!     bucket: "archive".to_string(),
//!     prefix: "backup/".to_string(),
//!     ..Default::default()
//! };
//! let destination = Arc::new(S3Storage::connect(&config).await?);
//!
//! let engine = CopyEngine::new(CopyOptions {
//!     concurrency: 8,
//!     continue_on_error: true,
//! });
//! let report = engine.transfer(&LocalStorage::new("/data"), destination).await?;
//! println!("Copied {} items", report.committed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod progress;
pub mod storage;

// Re-export commonly used types
pub use config::CopyConfig;
pub use crate::core::{copy_items, CopyEngine, CopyOptions, CopyReport};
pub use error::{Result, StoreCopyError};
pub use progress::ProgressReporter;
pub use storage::{Item, ItemStream, Storage};

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use storecopy::prelude::*;
    //! ```

    pub use crate::core::{copy_items, CopyEngine, CopyOptions, CopyReport};
    pub use crate::error::{Result, StoreCopyError};
    pub use crate::progress::ProgressReporter;
    pub use crate::storage::{
        GcsConfig, GcsStorage, Item, ItemStream, LocalStorage, S3Config, S3Storage, Storage,
    };
}
