use crate::collectors::network::DEFAULT_PUBLIC_IP_URL;
use crate::collectors::NetworkTtls;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const MIN_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(with = "humantime_str")]
    pub interval: Duration,
    #[serde(with = "humantime_str")]
    pub command_timeout: Duration,
    pub public_ip_url: String,
    pub ttl: TtlConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TtlConfig {
    #[serde(with = "humantime_str")]
    pub cpu: Duration,
    #[serde(with = "humantime_str")]
    pub gpu: Duration,
    #[serde(with = "humantime_str")]
    pub memory: Duration,
    #[serde(with = "humantime_str")]
    pub storage: Duration,
    #[serde(with = "humantime_str")]
    pub system: Duration,
    #[serde(with = "humantime_str")]
    pub uptime: Duration,
    #[serde(with = "humantime_str")]
    pub power: Duration,
    #[serde(with = "humantime_str")]
    pub network: Duration,
    #[serde(with = "humantime_str")]
    pub lan_ip: Duration,
    #[serde(with = "humantime_str")]
    pub public_ip: Duration,
    #[serde(with = "humantime_str")]
    pub ssid: Duration,
    #[serde(with = "humantime_str")]
    pub throughput: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            command_timeout: Duration::from_secs(5),
            public_ip_url: DEFAULT_PUBLIC_IP_URL.to_string(),
            ttl: TtlConfig::default(),
        }
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        let network = NetworkTtls::default();
        Self {
            cpu: Duration::from_secs(1),
            gpu: Duration::from_secs(2),
            memory: Duration::from_secs(3),
            storage: Duration::from_secs(60),
            system: Duration::from_secs(600),
            uptime: Duration::from_millis(500),
            power: Duration::from_secs(5),
            network: Duration::from_secs(1),
            lan_ip: network.lan_ip,
            public_ip: network.public_ip,
            ssid: network.ssid,
            throughput: network.throughput,
        }
    }
}

impl TtlConfig {
    pub fn network_ttls(&self) -> NetworkTtls {
        NetworkTtls {
            lan_ip: self.lan_ip,
            public_ip: self.public_ip,
            ssid: self.ssid,
            throughput: self.throughput,
        }
    }

    fn named(&self) -> [(&'static str, Duration); 12] {
        [
            ("cpu", self.cpu),
            ("gpu", self.gpu),
            ("memory", self.memory),
            ("storage", self.storage),
            ("system", self.system),
            ("uptime", self.uptime),
            ("power", self.power),
            ("network", self.network),
            ("lan_ip", self.lan_ip),
            ("public_ip", self.public_ip),
            ("ssid", self.ssid),
            ("throughput", self.throughput),
        ]
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`Config::load_from_file`], but a file that does not exist yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match Self::load_from_file(path) {
            Err(ConfigError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::Validation(format!(
                "interval must be at least {}",
                humantime::format_duration(MIN_INTERVAL)
            )));
        }
        if self.command_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "command_timeout must be > 0".to_string(),
            ));
        }
        for (name, ttl) in self.ttl.named() {
            if ttl.is_zero() {
                return Err(ConfigError::Validation(format!("ttl.{name} must be > 0")));
            }
        }

        let url = self.public_ip_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Validation(
                "public_ip_url must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "public_ip_url '{url}' must be an http(s) URL"
            )));
        }

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

/// Durations as humantime strings such as `500ms` or `10m`.
mod humantime_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
    }
}
