//! DFU configuration file handling
//!
//! ```toml
//! [router]
//! min_identify_len = 32
//! init_failure = "keep_selection"
//!
//! [registry]
//! backends = ["mcuboot", "modem_delta", "full_modem", "application"]
//!
//! [registry.mcuboot]
//! flash_capacity = 1048576
//!
//! [registry.modem_delta]
//! scratch_capacity = 524288
//! ```

use std::path::Path;

use dfu_core::ImageType;
use dfu_target::RouterConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DfuConfig {
    /// Router behaviour
    #[serde(default)]
    pub router: RouterConfig,
    /// Which backends to register, and their settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl DfuConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Registry assembly settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Enabled backends, in identification scan order
    #[serde(default = "default_backends")]
    pub backends: Vec<ImageType>,
    /// Bootloader image secondary slot
    #[serde(default = "default_app_slot")]
    pub mcuboot: SlotConfig,
    /// Plain application slot
    #[serde(default = "default_app_slot")]
    pub application: SlotConfig,
    /// External flash for full modem images
    #[serde(default = "default_modem_slot")]
    pub full_modem: SlotConfig,
    /// Modem DFU channel
    #[serde(default)]
    pub modem_delta: ModemConfig,
}

fn default_backends() -> Vec<ImageType> {
    ImageType::ALL.to_vec()
}

fn default_app_slot() -> SlotConfig {
    SlotConfig {
        flash_capacity: 1024 * 1024,
    }
}

fn default_modem_slot() -> SlotConfig {
    SlotConfig {
        flash_capacity: 4 * 1024 * 1024,
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            mcuboot: default_app_slot(),
            application: default_app_slot(),
            full_modem: default_modem_slot(),
            modem_delta: ModemConfig::default(),
        }
    }
}

/// Flash slot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Slot size in bytes
    pub flash_capacity: usize,
}

/// Modem DFU channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    /// Size of the modem's scratch area in bytes
    #[serde(default = "default_scratch_capacity")]
    pub scratch_capacity: usize,
}

fn default_scratch_capacity() -> usize {
    512 * 1024
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            scratch_capacity: default_scratch_capacity(),
        }
    }
}
