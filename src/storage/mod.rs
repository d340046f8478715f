//! Local asset storage: the flash filesystem surface the cycle writes the
//! response into and the player reads it back from.
//!
//! [`AssetStore`] is the collaborator interface: create (truncating), open,
//! remove, exists.  [`FsStore`] implements it on a host directory.

pub mod fs;

use std::io::{Read, Write};

use thiserror::Error;

pub use fs::FsStore;

#[cfg(test)]
pub use fs::MemoryStore;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

/// Failures reported by an [`AssetStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("asset `{0}` not found")]
    NotFound(String),

    #[error("invalid asset name `{0}`")]
    InvalidName(String),

    #[error("storage I/O error on `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// AssetStore trait
// ---------------------------------------------------------------------------

/// Writer returned by [`AssetStore::create`].  Dropping it closes the asset.
pub type AssetWriter = Box<dyn Write + Send>;

/// Reader returned by [`AssetStore::open`].
pub type AssetReader = Box<dyn Read + Send>;

/// Named-blob storage.
///
/// Implementations must be `Send + Sync`; the transmitter writes from the
/// async runtime and the player reads from a blocking worker.
pub trait AssetStore: Send + Sync {
    /// Open `name` for writing, truncating any existing content.
    fn create(&self, name: &str) -> Result<AssetWriter, StorageError>;

    /// Open `name` for reading.
    fn open(&self, name: &str) -> Result<AssetReader, StorageError>;

    /// Delete `name`.  Removing a missing asset reports `NotFound`.
    fn remove(&self, name: &str) -> Result<(), StorageError>;

    fn exists(&self, name: &str) -> bool;
}

/// Delete an asset left behind by an interrupted run.
///
/// Returns `true` when something was removed.  Failures are logged, never
/// returned: a stale asset is overwritten by the next transfer anyway.
pub fn remove_stale(store: &dyn AssetStore, name: &str) -> bool {
    match store.remove(name) {
        Ok(()) => {
            log::warn!("removed stale {name} from a previous run");
            true
        }
        Err(StorageError::NotFound(_)) => false,
        Err(e) => {
            log::warn!("could not remove stale {name}: {e}");
            false
        }
    }
}

// Compile-time assertion: Box<dyn AssetStore> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn AssetStore>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn stale_asset_on_disk_is_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::mount(dir.path()).expect("mount");
        store
            .create("response.mp3")
            .expect("create")
            .write_all(b"left over")
            .expect("write");

        assert!(remove_stale(&store, "response.mp3"));
        assert!(!store.exists("response.mp3"));
        assert!(!dir.path().join("response.mp3").exists());
    }

    #[test]
    fn missing_asset_is_not_an_error() {
        let store = MemoryStore::new();
        assert!(!remove_stale(&store, "response.mp3"));
        assert!(store.names().is_empty());
    }

    #[test]
    fn only_the_named_asset_is_removed() {
        let store = MemoryStore::new();
        store.insert("response.mp3", b"old");
        store.insert("other.bin", b"keep");

        assert!(remove_stale(&store, "response.mp3"));
        assert_eq!(store.names(), vec!["other.bin".to_string()]);
    }

    #[test]
    fn invalid_name_is_reported_as_nothing_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::mount(dir.path()).expect("mount");
        assert!(!remove_stale(&store, "../escape"));
    }
}
