//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/thermcam.toml` (optional; every field has a default)
//! 2. Environment variables prefixed with `THERMCAM_`, `__` separating nesting levels
//!
//! # Example
//! ```no_run
//! use thermcam::config::ThermCamConfig;
//!
//! let config = ThermCamConfig::load()?;
//! println!("Port: {}", config.serial.port);
//! # Ok::<(), figment::Error>(())
//! ```
//!
//! Override a value from the environment:
//! `THERMCAM_SERIAL__BAUD_RATE=9600 thermcam monitor`

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/thermcam.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThermCamConfig {
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Device behaviour
    #[serde(default)]
    pub device: DeviceConfig,
    /// Viewport geometry used for renders
    #[serde(default)]
    pub view: ViewConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device node of the scanner controller
    #[serde(default = "default_port")]
    pub port: String,
    /// Line speed; must match the firmware exactly
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Directory holding `LCK..<device>` lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

/// Device behaviour configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// X position (degrees) the device is homed to after boot
    #[serde(default = "default_home")]
    pub home_x: i32,
    /// Y position (degrees) the device is homed to after boot
    #[serde(default = "default_home")]
    pub home_y: i32,
}

/// Viewport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Viewport width in pixels
    #[serde(default = "default_view_width")]
    pub width: u32,
    /// Viewport height in pixels
    #[serde(default = "default_view_height")]
    pub height: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("/var/lock")
}

fn default_home() -> i32 {
    90
}

fn default_view_width() -> u32 {
    800
}

fn default_view_height() -> u32 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            lock_dir: default_lock_dir(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            home_x: default_home(),
            home_y: default_home(),
        }
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            width: default_view_width(),
            height: default_view_height(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ThermCamConfig {
    /// Load configuration from `config/thermcam.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(ThermCamConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("THERMCAM_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if self.serial.port.trim().is_empty() {
            return Err("serial.port must not be empty".to_string());
        }

        if self.serial.baud_rate == 0 {
            return Err("serial.baud_rate must be positive".to_string());
        }

        if self.view.width == 0 || self.view.height == 0 {
            return Err("view.width and view.height must be positive".to_string());
        }

        Ok(())
    }
}
