// src/config.rs

//! Configuration structures for `frame-pump`.
//!
//! The configuration is read once, on first access to `CONFIG`, from the JSON
//! file named by the `FRAME_PUMP_CONFIG` environment variable. Every field has
//! a default, so a partial file (or no file at all) is fine. Command-line
//! arguments take precedence over the `pipeline` defaults.

use log::{info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "FRAME_PUMP_CONFIG";

/// Process-wide configuration.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::load_or_default);

// --- Top-Level Configuration Structure ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Producer loop and pool settings.
    pub pipeline: PipelineConfig,
    /// Behavior of the headless renderer sink.
    pub headless: HeadlessConfig,
}

impl Config {
    /// Loads the file named by `FRAME_PUMP_CONFIG`, falling back to defaults.
    pub fn load_or_default() -> Self {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => Config::default(),
        }
    }

    /// Loads `path`; an unreadable or malformed file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str::<Config>(&text).map_err(|e| e.to_string()));

        match parsed {
            Ok(config) => {
                info!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load configuration from {} ({}), using defaults",
                    path.display(),
                    e
                );
                Config::default()
            }
        }
    }
}

// --- Pipeline Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Buffers in the pool when none is given on the command line.
    /// Values below `MIN_BUFFER_COUNT` are raised to it.
    pub default_buffer_count: usize,
    pub default_width: u32,
    pub default_height: u32,
    /// How often the measured frame rate is printed.
    pub fps_report_interval_ms: u64,
    /// How often drain progress is reported during shutdown.
    pub drain_poll_interval_ms: u64,
}

/// Smallest usable pool: one buffer on screen, one being filled.
pub const MIN_BUFFER_COUNT: usize = 2;

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            default_buffer_count: MIN_BUFFER_COUNT,
            default_width: 1920,
            default_height: 1080,
            fps_report_interval_ms: 2000,
            drain_poll_interval_ms: 1000,
        }
    }
}

impl PipelineConfig {
    pub fn fps_report_interval(&self) -> Duration {
        Duration::from_millis(self.fps_report_interval_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }
}

// --- Headless Sink Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Simulated display refresh rate. 0 consumes frames as fast as they come.
    pub refresh_hz: f64,
    /// Keep the frame on screen until the next one replaces it.
    pub retain_last_frame: bool,
    /// Cap on payload memory, mimicking a fixed GPU memory split.
    pub payload_budget_bytes: Option<u64>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        HeadlessConfig {
            refresh_hz: 60.0,
            retain_last_frame: true,
            payload_budget_bytes: None,
        }
    }
}
