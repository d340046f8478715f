//! Host directory that stands in for the device's flash filesystem.
//!
//! Layout:
//!
//!   Windows: %LOCALAPPDATA%\voice-relay\flash\
//!   macOS:   ~/Library/Application Support/voice-relay/flash/
//!   Linux:   ~/.local/share/voice-relay/flash/

use std::path::{Path, PathBuf};

/// Resolved storage locations.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    /// Root directory holding persisted assets.
    pub flash_dir: PathBuf,
}

impl StoragePaths {
    const APP_NAME: &'static str = "voice-relay";

    /// Resolves the default flash directory using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard data path.
    pub fn new() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            flash_dir: data_dir.join("flash"),
        }
    }

    /// Use `root` when the config overrides it, otherwise the platform default.
    pub fn resolve(root: Option<&Path>) -> Self {
        match root {
            Some(root) => Self {
                flash_dir: root.to_path_buf(),
            },
            None => Self::new(),
        }
    }
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_flash_dir_ends_with_flash() {
        let paths = StoragePaths::new();
        assert!(paths.flash_dir.file_name().is_some_and(|n| n == "flash"));
        assert!(paths
            .flash_dir
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|n| n == "voice-relay"));
    }

    #[test]
    fn explicit_root_wins() {
        let paths = StoragePaths::resolve(Some(Path::new("/tmp/relay-flash")));
        assert_eq!(paths.flash_dir, PathBuf::from("/tmp/relay-flash"));
    }
}
