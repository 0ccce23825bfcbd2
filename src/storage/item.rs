//! Transferable items and the queue that carries them
//!
//! An [`Item`] owns the open byte stream of one file or object. Producers
//! publish items into an [`ItemSink`]; copy workers pull them from a shared
//! [`ItemStream`]. Each item is received by exactly one worker, and its
//! stream is released when the item is dropped.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncRead;

use crate::error::{Result, StoreCopyError};

/// Default number of discovered items buffered between producer and workers.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Exclusively owned content stream of an item.
pub type ItemReader = Pin<Box<dyn AsyncRead + Send>>;

/// One transferable unit discovered by a producer.
pub struct Item {
    /// Enumeration root the item was discovered under
    pub prefix: String,
    /// Absolute path or backend-native key
    pub path: String,
    /// Byte length, when the listing reports it
    pub size: Option<u64>,
    /// Open content stream
    pub content: ItemReader,
}

impl Item {
    /// Create an item from its identity and an already opened stream.
    pub fn new(
        prefix: impl Into<String>,
        path: impl Into<String>,
        size: Option<u64>,
        content: impl AsyncRead + Send + 'static,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            path: path.into(),
            size,
            content: Box::pin(content),
        }
    }

    /// Path of the item below its enumeration root.
    pub fn relative_path(&self) -> &str {
        relative_path(&self.prefix, &self.path)
    }

    /// Content type inferred from the file extension.
    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Prefix: {}) {}", self.prefix, self.path)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("prefix", &self.prefix)
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == std::path::MAIN_SEPARATOR
}

/// Strip `prefix` from `path` and any separators left at the front.
///
/// A path that does not start with the prefix is returned without its
/// leading separators.
pub fn relative_path<'a>(prefix: &str, path: &'a str) -> &'a str {
    path.strip_prefix(prefix)
        .unwrap_or(path)
        .trim_start_matches(is_separator)
}

/// Join a relative path under an object-store key prefix.
pub fn join_key(prefix: &str, relative: &str) -> String {
    let relative = relative.replace(std::path::MAIN_SEPARATOR, "/");
    let relative = relative.trim_start_matches('/');
    let prefix = prefix.trim_end_matches('/');

    if prefix.is_empty() {
        relative.to_string()
    } else if relative.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, relative)
    }
}

/// Resolve a relative path under a local root, refusing anything that could
/// land outside of it.
pub fn local_target(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let mut target = root.to_path_buf();
    let mut depth = 0usize;

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(StoreCopyError::InvalidPath(format!(
                    "{} escapes the destination root",
                    relative.display()
                )))
            }
        }
    }

    if depth == 0 {
        return Err(StoreCopyError::InvalidPath(
            "empty relative path".to_string(),
        ));
    }

    Ok(target)
}

/// Receiving half of the item queue, shared by all copy workers.
#[derive(Clone)]
pub struct ItemStream {
    rx: async_channel::Receiver<Item>,
}

/// Sending half of the item queue, owned by a producer task.
#[derive(Clone)]
pub struct ItemSink {
    tx: async_channel::Sender<Item>,
}

impl ItemStream {
    /// Create a queue. `None` means unbounded.
    pub fn channel(depth: Option<usize>) -> (ItemSink, ItemStream) {
        let (tx, rx) = match depth {
            Some(depth) => async_channel::bounded(depth.max(1)),
            None => async_channel::unbounded(),
        };
        (ItemSink { tx }, ItemStream { rx })
    }

    /// A stream that yields nothing.
    pub fn empty() -> Self {
        let (_, stream) = Self::channel(Some(1));
        stream
    }

    /// Wait for the next available item. `None` once the producer finished
    /// and the queue is drained, or after [`close`](Self::close).
    pub async fn next(&self) -> Option<Item> {
        self.rx.recv().await.ok()
    }

    /// Stop the producer. Items already queued stay receivable until the
    /// last stream handle is dropped.
    pub fn close(&self) {
        self.rx.close();
    }

}

impl ItemSink {
    /// Publish an item. Returns `false` when every consumer is gone, in
    /// which case the item (and its stream) is dropped.
    pub async fn send(&self, item: Item) -> bool {
        self.tx.send(item).await.is_ok()
    }

    /// Blocking variant for producers running on a blocking thread.
    pub fn send_blocking(&self, item: Item) -> bool {
        self.tx.send_blocking(item).is_ok()
    }
}
