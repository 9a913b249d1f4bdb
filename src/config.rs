use anyhow::{bail, Context, Result};
use serde::Deserialize;
use stagg_ekg_lib::client::ClientOptions;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "stagg.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub entity_id: Option<String>,
    /// Quality of service code to use
    #[serde(default = "default_qos")]
    qos: u8,
    #[serde(default = "default_keep_alive", with = "humantime_serde")]
    pub keep_alive: Duration,
}

fn default_qos() -> u8 {
    0
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(20)
}

impl MqttConfig {
    pub fn qos(&self) -> i32 {
        self.qos as i32
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientOptions,
    pub mqtt: Option<MqttConfig>,
}

impl Config {
    fn validate(&self) -> Result<()> {
        if let Some(mqtt) = &self.mqtt {
            if mqtt.qos > 2 {
                bail!("Invalid MQTT qos {}, expected 0, 1 or 2", mqtt.qos);
            }
        }
        Ok(())
    }
}

fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default_file = Path::new(DEFAULT_CONFIG_FILE);
            default_file.exists().then(|| default_file.to_path_buf())
        }
    }
}

/// Loads the configuration, falling back to defaults when no file is present.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let Some(path) = config_file_path(explicit) else {
        log::debug!("No config file found, using defaults");
        return Ok(Config::default());
    };
    log::debug!("Loading config file from {path:?}");
    let file = File::open(&path).with_context(|| format!("Cannot open config file {path:?}"))?;
    let config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("Cannot parse config file {path:?}"))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let yaml = r#"
client:
  connect_attempts: 5
  connect_backoff: 1s
  write_spacing: 250ms
mqtt:
  url: tcp://localhost:1883
  entity_id: kitchen
  qos: 1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.client.connect_attempts, 5);
        assert_eq!(config.client.connect_backoff, Duration::from_secs(1));
        assert_eq!(config.client.write_spacing, Duration::from_millis(250));
        assert_eq!(
            config.client.schedule_phase_delay,
            ClientOptions::default().schedule_phase_delay
        );
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.entity_id.as_deref(), Some("kitchen"));
        assert_eq!(mqtt.qos(), 1);
        assert_eq!(mqtt.keep_alive, Duration::from_secs(20));
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.client, ClientOptions::default());
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn rejects_invalid_qos() {
        let config: Config = serde_yaml::from_str("mqtt:\n  url: tcp://localhost:1883\n  qos: 3\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load(Some(Path::new("does/not/exist.yml"))).is_err());
    }
}
