//! Storage backends
//!
//! Every backend implements the same two-operation capability: enumerate
//! the items under its configured root, and write one item below it.
//! The copy engine only ever sees a `dyn Storage`.

mod gcs;
mod item;
mod local;
mod s3;
#[cfg(test)]
pub(crate) mod testing;

pub use gcs::*;
pub use item::*;
pub use local::*;
pub use s3::*;

use crate::error::Result;
use async_trait::async_trait;

/// Capability shared by the local, S3 and GCS backends.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Human-readable location, used in log records.
    fn location(&self) -> String;

    /// Start enumerating every item under this backend's root.
    ///
    /// The producer runs as its own task on the current tokio runtime and
    /// publishes into the returned stream. Enumeration failures are logged
    /// and simply end the stream early.
    fn list_files(&self) -> ItemStream;

    /// Write one item below this backend's root, returning the number of
    /// bytes written. The item's stream is consumed and released whatever
    /// the outcome.
    async fn put_file(&self, item: Item) -> Result<u64>;
}
