//! Bridge configuration, loaded from `config.json` at session start.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detect::DetectorConfig;
use crate::watchdog::WatchdogConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Session configuration. Immutable once a session starts; a restart picks
/// up changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Serial port identifier, e.g. `COM10`.
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baudrate")]
    pub baudrate: u32,

    /// Exact title of the target application's main window.
    #[serde(default)]
    pub target_app_title: String,

    /// Automation identifier of the input textbox.
    #[serde(default)]
    pub textbox_auto_id: String,

    /// Automation backend selector, passed through to the port
    /// implementation.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Fire the reset sequence before every forwarded message.
    #[serde(default)]
    pub auto_reset: bool,

    /// Regex tried against window titles when the exact match fails.
    #[serde(default)]
    pub target_title_pattern: Option<String>,

    /// Executable path tried when title-based resolution fails.
    #[serde(default)]
    pub target_process_path: Option<String>,

    /// First keystroke of the reset sequence, in the automation backend's
    /// key syntax (`%c` is Alt+C).
    #[serde(default = "default_reset_primary")]
    pub reset_shortcut_primary: String,

    /// Second keystroke of the reset sequence, sent after a settle delay.
    #[serde(default = "default_reset_secondary")]
    pub reset_shortcut_secondary: String,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

fn default_port() -> String {
    if cfg!(windows) {
        "COM10".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

fn default_baudrate() -> u32 {
    115200
}

fn default_backend() -> String {
    "win32".to_string()
}

fn default_reset_primary() -> String {
    "%c".to_string()
}

fn default_reset_secondary() -> String {
    "%r".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baudrate: default_baudrate(),
            target_app_title: String::new(),
            textbox_auto_id: String::new(),
            backend: default_backend(),
            auto_reset: false,
            target_title_pattern: None,
            target_process_path: None,
            reset_shortcut_primary: default_reset_primary(),
            reset_shortcut_secondary: default_reset_secondary(),
            detector: DetectorConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, falling back to defaults when it is absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            log::warn!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.is_empty() {
            return Err(ConfigError::Invalid("port must not be empty".to_string()));
        }
        if self.baudrate == 0 {
            return Err(ConfigError::Invalid(
                "baudrate must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
