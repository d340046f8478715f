//! Configuration module for the voice relay device.
//!
//! Provides `DeviceConfig` (top-level settings baked into the binary from
//! `device.toml`), sub-configs for each subsystem, and `StoragePaths` for the
//! flash-filesystem stand-in directory.

pub mod paths;
pub mod settings;

pub use paths::StoragePaths;
pub use settings::{
    CaptureConfig, ConfigError, DeviceConfig, PlaybackConfig, ServiceConfig, StorageConfig,
};
