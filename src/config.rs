//! Application configuration
//!
//! Stored as TOML under the user's config directory. A default file is written
//! on first start; every section falls back to its defaults so that partial
//! files stay valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CONFIG_DIR: &str = "imu-mouse";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration directory available on this system")]
    NoConfigDir,

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Maximum tracing level: error, warn, info, debug or trace
    pub log_level: String,
    pub session: SessionConfig,
    pub device: DeviceConfig,
    pub pointer: PointerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            session: SessionConfig::default(),
            device: DeviceConfig::default(),
            pointer: PointerConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle detection window and key polling period
    pub poll_interval_ms: u64,
    /// Pause between empty scans
    pub scan_retry_ms: u64,
    /// Capacity of the device message channel
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            scan_retry_ms: 500,
            channel_capacity: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackendKind {
    #[default]
    Simulated,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: DeviceBackendKind,
    pub simulated: SimulatedDeviceConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SimulatedDeviceConfig {
    pub device_id: String,
    pub port_name: String,
    /// Quaternion output rate
    pub sample_rate_hz: u32,
    /// Period of one AX1 press/release toggle
    pub click_period_ms: u64,
    /// Stop streaming after this many packets
    pub stall_after_packets: Option<u64>,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            device_id: "SIM0001".to_string(),
            port_name: "sim0".to_string(),
            sample_rate_hz: 128,
            click_period_ms: 4000,
            stall_after_packets: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PointerBackendKind {
    Uinput,
    Log,
}

impl Default for PointerBackendKind {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            PointerBackendKind::Uinput
        } else {
            PointerBackendKind::Log
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PointerConfig {
    pub backend: PointerBackendKind,
    pub device_name: String,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            backend: PointerBackendKind::default(),
            device_name: "x-IMU Mouse".to_string(),
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.session.scan_retry_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.scan_retry_ms must be greater than 0".to_string(),
            ));
        }
        if self.session.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session.channel_capacity must be greater than 0".to_string(),
            ));
        }
        if self.device.simulated.sample_rate_hz == 0 {
            return Err(ConfigError::Invalid(
                "device.simulated.sample_rate_hz must be greater than 0".to_string(),
            ));
        }
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Writes the default configuration if none exists yet; returns `true`
    /// when a file was created
    pub async fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if tokio::fs::try_exists(path).await.map_err(io_err)? {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = toml::to_string_pretty(&AppConfig::default())?;
        tokio::fs::write(path, content).await.map_err(io_err)?;
        Ok(true)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content, path)
    }

    /// Loads the user's configuration, falling back to defaults when the
    /// file cannot be created or read
    ///
    /// Runs before logging is set up, so the outcome is returned as a
    /// [`ConfigOrigin`] for the caller to report.
    pub async fn load_or_default() -> Result<(Self, ConfigOrigin), ConfigError> {
        match Self::default_path() {
            Ok(path) => Self::load_or_create(path).await,
            Err(e) => Ok((Self::default(), ConfigOrigin::Defaults(e))),
        }
    }

    pub async fn load_or_create(path: PathBuf) -> Result<(Self, ConfigOrigin), ConfigError> {
        let created = match Self::ensure_default_config(&path).await {
            Ok(created) => created,
            Err(e) => return Ok((Self::default(), ConfigOrigin::Defaults(e))),
        };

        // a broken file is reported rather than silently replaced
        let config = Self::load(&path).await?;
        let origin = if created {
            ConfigOrigin::Created(path)
        } else {
            ConfigOrigin::Loaded(path)
        };
        Ok((config, origin))
    }
}

/// Where the active configuration came from
#[derive(Debug)]
pub enum ConfigOrigin {
    Loaded(PathBuf),
    /// A default file was written first
    Created(PathBuf),
    /// No file could be used
    Defaults(ConfigError),
}

impl ConfigOrigin {
    pub fn log(&self) {
        match self {
            ConfigOrigin::Loaded(path) => info!("Loaded configuration from {}", path.display()),
            ConfigOrigin::Created(path) => {
                info!("Wrote default configuration to {}", path.display())
            }
            ConfigOrigin::Defaults(e) => warn!("{}, using defaults", e),
        }
    }
}
