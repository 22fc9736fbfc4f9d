//! Bridge configuration.
//!
//! [`BridgeConfig`] controls the resource limits applied to the guest, the
//! frame schedule, and the export names the loader looks for.  Sensible
//! defaults are provided via the [`Default`] implementation, a builder-style
//! API allows callers to customise individual fields fluently, and
//! [`BridgeConfig::load`] reads overrides from a TOML file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::abi::{FRAME_EXPORT, MEMORY_EXPORT, SETUP_EXPORT};
use crate::error::{BridgeError, Result};

/// Export names making up the guest's entry-point contract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EntryPoints {
    /// One-time setup function, `() -> ()`.
    pub setup: String,
    /// Per-frame function, `() -> ()`.
    pub frame: String,
    /// Linear memory export.
    pub memory: String,
}

impl Default for EntryPoints {
    fn default() -> Self {
        Self {
            setup: SETUP_EXPORT.to_owned(),
            frame: FRAME_EXPORT.to_owned(),
            memory: MEMORY_EXPORT.to_owned(),
        }
    }
}

/// Resource limits and scheduling for a bridge session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum linear memory the guest may grow to, in bytes.
    ///
    /// Default: **64 MiB**.
    pub max_memory: usize,

    /// Fuel (abstract instruction count) granted to each setup or frame
    /// call.  `None` disables fuel metering.
    ///
    /// Default: **50 000 000**.
    pub fuel_per_call: Option<u64>,

    /// Display refresh rate driving the frame loop, in Hz.
    ///
    /// Default: **60**.
    pub frame_rate: u32,

    /// Stop after this many frames.  `None` runs until teardown.
    ///
    /// Default: **None**.
    pub max_frames: Option<u64>,

    /// Timeout for fetching a module over HTTP, in milliseconds.
    ///
    /// Default: **30 000 ms**.
    pub fetch_timeout_ms: u64,

    /// Largest module binary the loader accepts, in bytes.
    ///
    /// Default: **64 MiB**.
    pub max_module_bytes: u64,

    /// Export names the loader requires.
    pub entry_points: EntryPoints,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_memory: 64 * 1024 * 1024,
            fuel_per_call: Some(50_000_000),
            frame_rate: 60,
            max_frames: None,
            fetch_timeout_ms: 30_000,
            max_module_bytes: 64 * 1024 * 1024,
            entry_points: EntryPoints::default(),
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text.
    ///
    /// Keys that are absent keep their default value.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults if it is missing.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::info!(path = %path.display(), "loaded bridge config");
                Self::from_toml_str(&text)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(BridgeError::Io(err)),
        }
    }

    /// Reject values the frame driver cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(BridgeError::Config("frame_rate must be at least 1".into()));
        }
        if self.max_module_bytes == 0 {
            return Err(BridgeError::Config(
                "max_module_bytes must be at least 1".into(),
            ));
        }
        if self.entry_points.setup == self.entry_points.frame {
            return Err(BridgeError::Config(format!(
                "setup and frame entry points must differ (both `{}`)",
                self.entry_points.setup
            )));
        }
        Ok(())
    }

    /// Interval between display ticks.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.frame_rate.max(1)))
    }

    /// Fetch timeout as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Set the maximum memory limit (in bytes).
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.max_memory = bytes;
        self
    }

    /// Set the per-call fuel budget (`None` disables metering).
    pub fn with_fuel_per_call(mut self, fuel: Option<u64>) -> Self {
        self.fuel_per_call = fuel;
        self
    }

    /// Set the display refresh rate (in Hz).
    pub fn with_frame_rate(mut self, hz: u32) -> Self {
        self.frame_rate = hz;
        self
    }

    /// Stop the frame loop after `frames` frames.
    pub fn with_max_frames(mut self, frames: Option<u64>) -> Self {
        self.max_frames = frames;
        self
    }

    /// Set the fetch timeout (in milliseconds).
    pub fn with_fetch_timeout_ms(mut self, ms: u64) -> Self {
        self.fetch_timeout_ms = ms;
        self
    }

    /// Set the largest accepted module size (in bytes).
    pub fn with_max_module_bytes(mut self, bytes: u64) -> Self {
        self.max_module_bytes = bytes;
        self
    }

    /// Override the required export names.
    pub fn with_entry_points(mut self, entry_points: EntryPoints) -> Self {
        self.entry_points = entry_points;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.max_memory, 64 * 1024 * 1024);
        assert_eq!(cfg.fuel_per_call, Some(50_000_000));
        assert_eq!(cfg.frame_rate, 60);
        assert_eq!(cfg.max_frames, None);
        assert_eq!(cfg.fetch_timeout_ms, 30_000);
        assert_eq!(cfg.max_module_bytes, 64 * 1024 * 1024);
        assert_eq!(cfg.entry_points.setup, "__main");
        assert_eq!(cfg.entry_points.frame, "__draw");
        assert_eq!(cfg.entry_points.memory, "memory");
    }

    #[test]
    fn builder_chaining() {
        let cfg = BridgeConfig::new()
            .with_max_memory(8 * 1024 * 1024)
            .with_fuel_per_call(None)
            .with_frame_rate(30)
            .with_max_frames(Some(10))
            .with_fetch_timeout_ms(500)
            .with_max_module_bytes(4096);
        assert_eq!(cfg.max_memory, 8 * 1024 * 1024);
        assert_eq!(cfg.fuel_per_call, None);
        assert_eq!(cfg.frame_rate, 30);
        assert_eq!(cfg.max_frames, Some(10));
        assert_eq!(cfg.fetch_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.max_module_bytes, 4096);
    }

    #[test]
    fn frame_interval_matches_rate() {
        let cfg = BridgeConfig::new().with_frame_rate(50);
        assert_eq!(cfg.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = BridgeConfig::from_toml_str(
            r#"
            frame_rate = 120

            [entry_points]
            frame = "tick"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.frame_rate, 120);
        assert_eq!(cfg.entry_points.frame, "tick");
        assert_eq!(cfg.entry_points.setup, "__main");
        assert_eq!(cfg.max_memory, 64 * 1024 * 1024);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = BridgeConfig::from_toml_str("frame_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let err = BridgeConfig::from_toml_str("frame_rate = 0").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn zero_module_limit_is_rejected() {
        let err = BridgeConfig::from_toml_str("max_module_bytes = 0").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn identical_entry_points_are_rejected() {
        let err = BridgeConfig::from_toml_str(
            r#"
            [entry_points]
            setup = "run"
            frame = "run"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir creation must succeed in tests");
        let cfg = BridgeConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.frame_rate, 60);
    }

    #[test]
    fn load_reads_file() {
        let tmp = tempfile::tempdir().expect("tempdir creation must succeed in tests");
        let path = tmp.path().join("framehost.toml");
        std::fs::write(&path, "max_frames = 3\nfuel_per_call = 1000\n").unwrap();
        let cfg = BridgeConfig::load(&path).unwrap();
        assert_eq!(cfg.max_frames, Some(3));
        assert_eq!(cfg.fuel_per_call, Some(1000));
    }

    #[test]
    fn shipped_default_file_matches_defaults() {
        let text = include_str!("../../../config/default.toml");
        let cfg = BridgeConfig::from_toml_str(text).unwrap();
        let defaults = BridgeConfig::default();
        assert_eq!(cfg.max_memory, defaults.max_memory);
        assert_eq!(cfg.fuel_per_call, defaults.fuel_per_call);
        assert_eq!(cfg.frame_rate, defaults.frame_rate);
        assert_eq!(cfg.max_frames, None);
        assert_eq!(cfg.max_module_bytes, defaults.max_module_bytes);
        assert_eq!(cfg.entry_points, defaults.entry_points);
    }
}
