//! Keyed object stores backing chunked containers
//!
//! A container addresses its metadata documents and chunks by relative,
//! `/` separated keys. [`FileSystemStore`] maps those keys onto files below a
//! root directory; other stores can be plugged in by implementing
//! [`ContainerStore`].

use crate::error::{PixelsError, Result};
use bytes::Bytes;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Blocking key/value access to the objects of one container
pub trait ContainerStore: Send + Sync {
    /// Read the object stored under `key`
    fn read(&self, key: &str) -> Result<Bytes>;

    /// Read the object stored under `key`, or `None` if it was never written
    fn read_optional(&self, key: &str) -> Result<Option<Bytes>> {
        if self.exists(key)? {
            self.read(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Replace the object stored under `key`
    fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    fn delete(&self, key: &str) -> Result<()>;

    /// Names of the entries directly below `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Stored size in bytes of the object under `key`
    fn size(&self, key: &str) -> Result<u64>;

    /// Location of the store, used in messages
    fn location(&self) -> &Path;
}

/// Store keeping every object in its own file below a root directory
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn create(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open a store over an existing directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(PixelsError::InvalidFormat(format!(
                "{} is not a container directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        if key.split('/').any(|part| part == "..") || key.starts_with('/') {
            return Err(PixelsError::InvalidConfiguration(format!(
                "key {} escapes the container",
                key
            )));
        }
        Ok(self.root.join(key))
    }
}

impl ContainerStore for FileSystemStore {
    fn read(&self, key: &str) -> Result<Bytes> {
        let data = fs::read(self.full_path(key)?)?;
        trace!(key, len = data.len(), "read object");
        Ok(Bytes::from(data))
    }

    fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&full_path)?;
        file.write_all(data)?;
        trace!(key, len = data.len(), "wrote object");
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.full_path(key)?.exists())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key)?;
        let removed = if full_path.is_dir() {
            fs::remove_dir_all(&full_path)
        } else {
            fs::remove_file(&full_path)
        };
        match removed {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            other => Ok(other?),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let full_path = self.full_path(prefix)?;
        let mut entries = Vec::new();

        if full_path.is_dir() {
            for entry in fs::read_dir(&full_path)? {
                if let Some(name) = entry?.file_name().to_str() {
                    entries.push(name.to_string());
                }
            }
        }

        entries.sort();
        Ok(entries)
    }

    fn size(&self, key: &str) -> Result<u64> {
        Ok(fs::metadata(self.full_path(key)?)?.len())
    }

    fn location(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_system_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemStore::create(temp_dir.path().join("container")).unwrap();

        let data = b"pixels";
        store.write("pixels/chunks/0.0.0.0.0", data).unwrap();

        let read_data = store.read("pixels/chunks/0.0.0.0.0").unwrap();
        assert_eq!(&read_data[..], data);

        assert!(store.exists("pixels/chunks/0.0.0.0.0").unwrap());
        assert!(!store.exists("pixels/chunks/1.0.0.0.0").unwrap());
        assert!(store.read_optional("pixels/chunks/1.0.0.0.0").unwrap().is_none());

        assert_eq!(store.size("pixels/chunks/0.0.0.0.0").unwrap(), data.len() as u64);
        assert_eq!(store.list("pixels").unwrap(), vec!["chunks".to_string()]);

        store.delete("pixels/chunks/0.0.0.0.0").unwrap();
        assert!(!store.exists("pixels/chunks/0.0.0.0.0").unwrap());
        store.delete("pixels/chunks/0.0.0.0.0").unwrap();
    }

    #[test]
    fn test_keys_cannot_escape_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemStore::create(temp_dir.path()).unwrap();
        assert!(store.write("../outside", b"x").is_err());
        assert!(store.read("/etc/passwd").is_err());
    }

    #[test]
    fn test_open_requires_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            FileSystemStore::open(temp_dir.path().join("missing")),
            Err(PixelsError::InvalidFormat(_))
        ));
    }
}
