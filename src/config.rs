use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::Deserialize;
use uuid::Uuid;

const DEFAULT_UPDATE_INTERVAL_SECONDS: u64 = 60;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Process exit status for each failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConfigError::Read { .. } => 2,
            ConfigError::Parse { .. } => 3,
            ConfigError::Invalid(_) => 4,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    /// Occupancy entity name, e.g. `office`
    pub entity: String,
    /// Bluetooth adapter index
    pub adapter: Option<usize>,
    pub occupancy: Option<OccupancyConfig>,
    pub hass: Option<HassConfig>,
    pub mqtt: Option<MqttConfig>,
    #[serde(default)]
    pub beacons: Vec<BeaconConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct OccupancyConfig {
    pub update_interval_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct HassConfig {
    pub url: String,
    pub token: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BeaconConfig {
    pub name: String,
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    pub min_rssi: i16,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig =
            toml::de::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.entity.trim().is_empty() {
            return Err(ConfigError::Invalid("entity must not be empty".to_string()));
        }
        if self.hass.is_none() && self.mqtt.is_none() {
            return Err(ConfigError::Invalid(
                "at least one of [hass] or [mqtt] must be configured".to_string(),
            ));
        }
        if self.update_interval().is_zero() {
            return Err(ConfigError::Invalid(
                "update_interval_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(
            self.occupancy
                .as_ref()
                .and_then(|o| o.update_interval_seconds)
                .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECONDS),
        )
    }
}
