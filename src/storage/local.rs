//! Local filesystem backend
//!
//! Enumerates a directory tree with `walkdir` on a blocking thread and
//! writes items below a root directory with `tokio::fs`.

use crate::error::{IoResultExt, Result, StoreCopyError};
use crate::storage::{local_target, Item, ItemSink, ItemStream, Storage, DEFAULT_QUEUE_DEPTH};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

/// Storage rooted at a local path.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    follow_symlinks: bool,
    queue_depth: Option<usize>,
}

impl LocalStorage {
    /// Create a backend rooted at `root`. The root may be a directory or,
    /// when used as a source, a single file.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_symlinks: false,
            queue_depth: Some(DEFAULT_QUEUE_DEPTH),
        }
    }

    /// Follow symbolic links while walking
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Set how many discovered items may wait in the queue (`None` = unbounded)
    pub fn with_queue_depth(mut self, depth: Option<usize>) -> Self {
        self.queue_depth = depth;
        self
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn list_files(&self) -> ItemStream {
        let (sink, stream) = ItemStream::channel(self.queue_depth);
        let root = self.root.clone();
        let follow = self.follow_symlinks;

        tokio::task::spawn_blocking(move || walk(&root, follow, &sink));

        stream
    }

    async fn put_file(&self, mut item: Item) -> Result<u64> {
        let target = local_target(&self.root, item.relative_path())?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.with_path(parent)?;
        }

        let mut file = tokio::fs::File::create(&target).await.with_path(&target)?;
        let written = tokio::io::copy(&mut item.content, &mut file)
            .await
            .with_path(&target)?;
        file.flush().await.with_path(&target)?;

        Ok(written)
    }
}

/// Walk `root` and publish one item per file or symlinked file.
fn walk(root: &Path, follow_symlinks: bool, sink: &ItemSink) {
    let root = match std::path::absolute(root) {
        Ok(root) => root,
        Err(e) => {
            tracing::error!("{}", StoreCopyError::enumeration(root.display().to_string(), e));
            return;
        }
    };

    let metadata = match std::fs::metadata(&root) {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::error!("{}", StoreCopyError::enumeration(root.display().to_string(), e));
            return;
        }
    };

    if !metadata.is_dir() {
        let prefix = root.parent().unwrap_or(Path::new("")).to_path_buf();
        if let Some(item) = open_item(&prefix, &root, Some(metadata.len())) {
            sink.send_blocking(item);
        }
        return;
    }

    tracing::info!("Traversing {}...", root.display());

    let walker = WalkDir::new(&root)
        .follow_links(follow_symlinks)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                tracing::error!("{}", StoreCopyError::enumeration(root.display().to_string(), e));
                return;
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let size = if file_type.is_symlink() {
            // not followed by the walk, so resolve the target here
            match std::fs::metadata(entry.path()) {
                Ok(target) if target.is_file() => Some(target.len()),
                Ok(_) => {
                    tracing::debug!("Skipping symlink to directory {}", entry.path().display());
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Skipping dangling symlink {}: {}", entry.path().display(), e);
                    continue;
                }
            }
        } else if file_type.is_file() {
            entry.metadata().ok().map(|m| m.len())
        } else {
            // fifos, sockets and devices would block or never end
            tracing::debug!("Skipping special file {}", entry.path().display());
            continue;
        };

        if let Some(item) = open_item(&root, entry.path(), size) {
            if !sink.send_blocking(item) {
                tracing::debug!("Item queue closed, stopping traversal of {}", root.display());
                return;
            }
        }
    }
}

fn open_item(prefix: &Path, path: &Path, size: Option<u64>) -> Option<Item> {
    match std::fs::File::open(path) {
        Ok(file) => Some(Item::new(
            prefix.to_string_lossy(),
            path.to_string_lossy(),
            size,
            tokio::fs::File::from_std(file),
        )),
        Err(e) => {
            tracing::warn!("{}", StoreCopyError::open(path.display().to_string(), e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_structure(dir: &Path) {
        std::fs::create_dir_all(dir.join("sub/nested")).unwrap();
        File::create(dir.join("a.txt")).unwrap().write_all(&[b'a'; 10]).unwrap();
        File::create(dir.join("sub/b.txt")).unwrap().write_all(&[b'b'; 20]).unwrap();
        File::create(dir.join("sub/nested/c.bin")).unwrap().write_all(b"c").unwrap();
    }

    async fn collect(stream: ItemStream) -> Vec<Item> {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn test_list_directory_in_walk_order() {
        let src = TempDir::new().unwrap();
        create_test_structure(src.path());

        let items = collect(LocalStorage::new(src.path()).list_files()).await;
        let relative: Vec<_> = items.iter().map(|i| i.relative_path().to_string()).collect();

        assert_eq!(relative, vec!["a.txt", "sub/b.txt", "sub/nested/c.bin"]);
        assert_eq!(items[0].size, Some(10));
        assert_eq!(items[1].size, Some(20));
        assert!(items.iter().all(|i| i.path.starts_with(&i.prefix)));
    }

    #[tokio::test]
    async fn test_list_single_file_root() {
        let src = TempDir::new().unwrap();
        create_test_structure(src.path());

        let items = collect(LocalStorage::new(src.path().join("sub/b.txt")).list_files()).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].relative_path(), "b.txt");
        assert_eq!(items[0].size, Some(20));
    }

    #[tokio::test]
    async fn test_list_empty_and_missing_roots() {
        let src = TempDir::new().unwrap();
        assert!(collect(LocalStorage::new(src.path()).list_files()).await.is_empty());

        let missing = LocalStorage::new(src.path().join("does-not-exist"));
        assert!(collect(missing.list_files()).await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_includes_symlinked_file() {
        let src = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        std::fs::write(src.path().join("a.txt"), b"a").unwrap();
        std::fs::write(outside.path().join("real.txt"), b"linked").unwrap();
        std::fs::create_dir(outside.path().join("dir")).unwrap();
        std::fs::write(outside.path().join("dir/hidden.txt"), b"h").unwrap();

        std::os::unix::fs::symlink(outside.path().join("real.txt"), src.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("dir"), src.path().join("linkdir")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone.txt"), src.path().join("dangling.txt")).unwrap();

        let mut items = collect(LocalStorage::new(src.path()).list_files()).await;
        let relative: Vec<_> = items.iter().map(|i| i.relative_path().to_string()).collect();
        assert_eq!(relative, vec!["a.txt", "link.txt"]);
        assert_eq!(items[1].size, Some(6));

        let mut content = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut items[1].content, &mut content)
            .await
            .unwrap();
        assert_eq!(content, b"linked");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_skips_unopenable_file() {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        create_test_structure(src.path());
        let locked = src.path().join("sub/locked.txt");
        std::fs::write(&locked, b"secret").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // privileged users can open the file regardless of its mode
        let readable = std::fs::File::open(&locked).is_ok();

        let items = collect(LocalStorage::new(src.path()).list_files()).await;
        let relative: Vec<_> = items.iter().map(|i| i.relative_path().to_string()).collect();

        let mut expected = vec!["a.txt", "sub/b.txt", "sub/nested/c.bin"];
        if readable {
            expected.insert(2, "sub/locked.txt");
        }
        assert_eq!(relative, expected);

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[tokio::test]
    async fn test_put_file_creates_parents() {
        let dst = TempDir::new().unwrap();
        let storage = LocalStorage::new(dst.path().join("restore"));

        let item = Item::new("backup/", "backup/sub/b.txt", Some(5), std::io::Cursor::new(b"hello".to_vec()));
        let written = storage.put_file(item).await.unwrap();

        assert_eq!(written, 5);
        let content = std::fs::read(dst.path().join("restore/sub/b.txt")).unwrap();
        assert_eq!(content, b"hello");
    }

    #[tokio::test]
    async fn test_put_file_truncates_existing() {
        let dst = TempDir::new().unwrap();
        std::fs::write(dst.path().join("a.txt"), b"much longer old content").unwrap();
        let storage = LocalStorage::new(dst.path());

        let item = Item::new("", "a.txt", None, std::io::Cursor::new(b"new".to_vec()));
        storage.put_file(item).await.unwrap();

        assert_eq!(std::fs::read(dst.path().join("a.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_put_file_rejects_traversal() {
        let dst = TempDir::new().unwrap();
        let storage = LocalStorage::new(dst.path().join("restore"));

        let item = Item::new("", "../escape.txt", None, std::io::Cursor::new(b"x".to_vec()));
        let err = storage.put_file(item).await.unwrap_err();

        assert!(matches!(err, StoreCopyError::InvalidPath(_)));
        assert!(!dst.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_list_then_put_round_trip() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_structure(src.path());

        let source = LocalStorage::new(src.path());
        let destination = LocalStorage::new(dst.path());
        let stream = source.list_files();
        while let Some(item) = stream.next().await {
            destination.put_file(item).await.unwrap();
        }

        assert_eq!(std::fs::read(dst.path().join("sub/b.txt")).unwrap(), vec![b'b'; 20]);
        assert_eq!(std::fs::read(dst.path().join("sub/nested/c.bin")).unwrap(), b"c");
    }
}
