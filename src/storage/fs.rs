//! Directory-backed [`AssetStore`].
//!
//! Each asset is a single file directly under the store root.  Names are
//! flat: a leading `/` is accepted (device-style paths such as
//! `/response.mp3`) but any other separator or `..` is rejected.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{AssetReader, AssetStore, AssetWriter, StorageError};

// ---------------------------------------------------------------------------
// FsStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Mount the store at `root`, creating the directory if needed.
    pub fn mount(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            name: root.display().to_string(),
            source,
        })?;
        log::debug!("storage mounted at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> Result<PathBuf, StorageError> {
        let flat = name.strip_prefix('/').unwrap_or(name);
        if flat.is_empty() || flat == "." || flat == ".." || flat.contains(['/', '\\']) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(flat))
    }
}

fn io_error(name: &str, source: std::io::Error) -> StorageError {
    if source.kind() == ErrorKind::NotFound {
        StorageError::NotFound(name.to_string())
    } else {
        StorageError::Io {
            name: name.to_string(),
            source,
        }
    }
}

impl AssetStore for FsStore {
    fn create(&self, name: &str) -> Result<AssetWriter, StorageError> {
        let path = self.path_of(name)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| io_error(name, e))?;
        Ok(Box::new(file))
    }

    fn open(&self, name: &str) -> Result<AssetReader, StorageError> {
        let path = self.path_of(name)?;
        let file = File::open(path).map_err(|e| io_error(name, e))?;
        Ok(Box::new(file))
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path_of(name)?;
        fs::remove_file(path).map_err(|e| io_error(name, e))
    }

    fn exists(&self, name: &str) -> bool {
        self.path_of(name).is_ok_and(|p| p.is_file())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore (test double)
// ---------------------------------------------------------------------------

/// In-memory store with switchable failures for transmitter/player tests.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct MemoryStore {
    files: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>>,
    /// Number of upcoming `create` calls that fail.
    pub failing_creates: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    /// When set, every write to a created asset fails after storing nothing.
    pub failing_writes: std::sync::Arc<std::sync::atomic::AtomicBool>,
    pub creates: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
struct MemoryWriter {
    name: String,
    files: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>>,
    fail: bool,
}

#[cfg(test)]
impl std::io::Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.fail {
            return Err(std::io::Error::new(ErrorKind::Other, "flash full"));
        }
        self.files
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl AssetStore for MemoryStore {
    fn create(&self, name: &str) -> Result<AssetWriter, StorageError> {
        use std::sync::atomic::Ordering;

        self.creates.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_creates.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_creates.store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::Io {
                name: name.to_string(),
                source: std::io::Error::new(ErrorKind::Other, "mount lost"),
            });
        }

        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), Vec::new());
        Ok(Box::new(MemoryWriter {
            name: name.to_string(),
            files: std::sync::Arc::clone(&self.files),
            fail: self.failing_writes.load(Ordering::SeqCst),
        }))
    }

    fn open(&self, name: &str) -> Result<AssetReader, StorageError> {
        let bytes = self
            .get(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.files
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn exists(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
