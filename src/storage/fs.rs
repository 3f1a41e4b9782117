//! Filesystem Blob Store
//!
//! Stores blobs as files under a root directory. Writes go to a temp file
//! in the target directory followed by a rename, so readers never observe
//! a half-written object.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::traits::{BlobStore, StorageError, StorageResult};

/// Filesystem-backed blob store
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a key to a path, rejecting traversal outside the root.
    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::InvalidKey(key.to_string()));
            }
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.resolve(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        // Temp file in the same directory so the rename stays on one filesystem.
        let tmp = parent.join(format!(
            ".{}.tmp-{}",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("blob"),
            std::process::id()
        ));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    // Skip temp files from interrupted writes.
                    continue;
                }
                if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        store.put("tile/entries/000", b"hello").await.unwrap();
        assert_eq!(
            store.get("tile/entries/000").await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(store.get("tile/entries/001").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        store.put("k", b"v1").await.unwrap();
        store.put("k", b"v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        assert!(matches!(
            store.put("../escape", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(store.get("a//b").await.is_err());
        assert!(store.get("").await.is_err());
    }

    #[tokio::test]
    async fn test_list_skips_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).unwrap();

        store.put("tile/0/000", b"a").await.unwrap();
        store.put("tile/entries/000", b"b").await.unwrap();
        std::fs::write(dir.path().join("tile/0/.000.tmp-999"), b"junk").unwrap();

        let keys = store.list("tile/").await.unwrap();
        assert_eq!(
            keys,
            vec!["tile/0/000".to_string(), "tile/entries/000".to_string()]
        );
    }
}
