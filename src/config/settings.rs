//! Device settings structs, defaults and the compiled-in TOML image.
//!
//! The device has no runtime configuration surface: [`DeviceConfig::builtin`]
//! parses `device.toml`, which is embedded into the binary at compile time.
//! All structs implement `Deserialize`, `Default` and `Clone` so the same
//! types back both the embedded image and test fixtures.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// TOML image baked into the binary.
const BUILTIN_TOML: &str = include_str!("../../device.toml");

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A setting that parsed but cannot drive the device.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("capture.sample_rate must be > 0")]
    ZeroSampleRate,

    #[error("capture.record_seconds must be > 0")]
    ZeroRecordWindow,

    #[error("capture.adc_midpoint ({midpoint}) exceeds capture.adc_max ({max})")]
    MidpointOutOfRange { midpoint: u16, max: u16 },

    #[error("service.max_attempts must be >= 1")]
    NoAttempts,

    #[error("service.endpoint is empty")]
    EmptyEndpoint,

    #[error("playback.gain must be within [0, 1], got {0}")]
    GainOutOfRange(f32),

    #[error("storage.asset_name is empty")]
    EmptyAssetName,
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Sampler cadence and ADC rescaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sampler frequency in Hz.  Also declared in the upload metadata, so the
    /// server always hears the rate the buffer was actually filled at.
    pub sample_rate: u32,
    /// Length of one recording window in seconds.
    pub record_seconds: u32,
    /// ADC reading that corresponds to silence.
    pub adc_midpoint: u16,
    /// Largest value the ADC can report (1023 for a 10-bit converter).
    pub adc_max: u16,
    /// Multiplier applied after removing the midpoint.
    pub mic_gain: i32,
    /// Delay between bring-up and the first recording.
    pub warmup_secs: u64,
    /// Pause between buffer-full polls in the dispatch loop, so the loop
    /// yields to the runtime instead of spinning.
    pub poll_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 4_000,
            record_seconds: 1,
            adc_midpoint: 512,
            adc_max: 1023,
            mic_gain: 64,
            warmup_secs: 5,
            poll_interval_ms: 2,
        }
    }
}

impl CaptureConfig {
    /// Sample buffer capacity `C = sample_rate × record_seconds`.
    pub fn capacity(&self) -> usize {
        self.sample_rate as usize * self.record_seconds as usize
    }

    /// Sampler period `T = 1 / sample_rate`.
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.sample_rate.max(1)))
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Remote voice service and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Full URL the raw PCM is POSTed to.
    pub endpoint: String,
    /// Attempts per cycle before the transfer is abandoned.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff_ms: u64,
    /// Per-request timeout for the HTTP client.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://192.168.1.10:5000/voice".into(),
            max_attempts: 3,
            backoff_ms: 1_000,
            timeout_secs: 30,
        }
    }
}

impl ServiceConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

/// Audio output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output gain in `[0, 1]`.
    pub gain: f32,
    /// Output device name; `None` selects the host default.
    pub output_device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            gain: 0.3,
            output_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Local asset storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Name of the persisted response asset.
    pub asset_name: String,
    /// Flash directory override; `None` uses [`crate::config::StoragePaths`].
    pub root: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            asset_name: "response.mp3".into(),
            root: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub capture: CaptureConfig,
    pub service: ServiceConfig,
    pub playback: PlaybackConfig,
    pub storage: StorageConfig,
}

impl DeviceConfig {
    /// Parse and validate the configuration compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TOML).context("embedded device.toml is invalid")
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the cycle cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if capture.record_seconds == 0 {
            return Err(ConfigError::ZeroRecordWindow);
        }
        if capture.adc_midpoint > capture.adc_max {
            return Err(ConfigError::MidpointOutOfRange {
                midpoint: capture.adc_midpoint,
                max: capture.adc_max,
            });
        }
        if self.service.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.service.endpoint.trim().is_empty() {
            return Err(ConfigError::EmptyEndpoint);
        }
        if !(0.0..=1.0).contains(&self.playback.gain) {
            return Err(ConfigError::GainOutOfRange(self.playback.gain));
        }
        if self.storage.asset_name.trim().is_empty() {
            return Err(ConfigError::EmptyAssetName);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_image_parses_and_matches_defaults() {
        let builtin = DeviceConfig::builtin().expect("builtin config");
        let default = DeviceConfig::default();

        assert_eq!(builtin.capture.sample_rate, default.capture.sample_rate);
        assert_eq!(builtin.capture.record_seconds, default.capture.record_seconds);
        assert_eq!(builtin.capture.adc_midpoint, default.capture.adc_midpoint);
        assert_eq!(builtin.capture.mic_gain, default.capture.mic_gain);
        assert_eq!(builtin.service.endpoint, default.service.endpoint);
        assert_eq!(builtin.service.max_attempts, default.service.max_attempts);
        assert_eq!(builtin.service.backoff_ms, default.service.backoff_ms);
        assert_eq!(builtin.playback.gain, default.playback.gain);
        assert_eq!(builtin.storage.asset_name, default.storage.asset_name);
    }

    #[test]
    fn default_values_match_device_constants() {
        let cfg = DeviceConfig::default();

        assert_eq!(cfg.capture.capacity(), 4_000);
        assert_eq!(cfg.capture.period(), Duration::from_micros(250));
        assert_eq!(cfg.capture.warmup(), Duration::from_secs(5));
        assert_eq!(cfg.service.max_attempts, 3);
        assert_eq!(cfg.service.backoff(), Duration::from_secs(1));
        assert!((cfg.playback.gain - 0.3).abs() < f32::EPSILON);
        assert!(cfg.playback.output_device.is_none());
        assert_eq!(cfg.storage.asset_name, "response.mp3");
        assert!(cfg.storage.root.is_none());
    }

    #[test]
    fn partial_document_fills_in_defaults() {
        let cfg = DeviceConfig::from_toml_str(
            r#"
            [capture]
            sample_rate = 8000
            record_seconds = 2
            "#,
        )
        .expect("parse");

        assert_eq!(cfg.capture.capacity(), 16_000);
        assert_eq!(cfg.capture.adc_midpoint, 512);
        assert_eq!(cfg.service.max_attempts, 3);
    }

    #[test]
    fn zero_sample_rate_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.capture.sample_rate = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSampleRate));
    }

    #[test]
    fn gain_above_one_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.playback.gain = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::GainOutOfRange(1.5)));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.service.max_attempts = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::NoAttempts));
    }

    #[test]
    fn midpoint_above_adc_max_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.capture.adc_midpoint = 2048;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::MidpointOutOfRange {
                midpoint: 2048,
                max: 1023
            })
        );
    }

    #[test]
    fn invalid_document_reports_error() {
        let err = DeviceConfig::from_toml_str("[storage]\nasset_name = \"\"\n");
        assert!(err.is_err());
    }
}
