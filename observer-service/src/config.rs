use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use data_encoding::HEXLOWER_PERMISSIVE;
use light_monitor::{
    alert::DEFAULT_ALERT_TITLE,
    ambient_light::{DEFAULT_BRIGHT_THRESHOLD, DEFAULT_DARK_THRESHOLD},
    AlertConfig, MonitorConfig, SlotId, Thresholds,
};
use serde::{Deserialize, Serialize};
use threema_gateway::SecretKey;

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawConfig {
    /// Sensor serial port. Readings are taken from stdin if missing.
    pub serial: Option<Serial>,
    #[serde(default)]
    pub monitor: RawMonitor,
    #[serde(default)]
    pub logging: Logging,
    pub threema: Option<RawThreema>,
}

impl RawConfig {
    /// Parse the config file at the specified path.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file at {:?}", path))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read config file to string")?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn example() -> Self {
        Self {
            serial: Some(Serial {
                port: PathBuf::from_str("/dev/ttyACM0").unwrap(),
                baudrate: 9600,
            }),
            monitor: RawMonitor::default(),
            logging: Logging::default(),
            threema: Some(RawThreema {
                gateway_id: "*YOUR_ID".to_string(),
                gateway_secret: "your-gateway-secret".to_string(),
                private_key: "00112233..CCDDEEFF".to_string(),
                recipients: vec!["AAAAAAAA".to_string(), "BBBBBBBB".to_string()],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Serial {
    /// The serial port.
    pub port: PathBuf,

    /// The baud rate.
    pub baudrate: u32,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RawMonitor {
    /// Readings at or below this lux value are dark
    pub dark_threshold: f32,

    /// Readings at or above this lux value are bright and raise an alert
    pub bright_threshold: f32,

    /// Notification slot. A new alert replaces the one in this slot.
    pub alert_slot: u32,

    /// Notification title
    pub alert_title: String,
}

impl Default for RawMonitor {
    fn default() -> Self {
        Self {
            dark_threshold: DEFAULT_DARK_THRESHOLD,
            bright_threshold: DEFAULT_BRIGHT_THRESHOLD,
            alert_slot: SlotId::default().0,
            alert_title: DEFAULT_ALERT_TITLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Log filter, e.g. "info" or "light_observer=debug". `RUST_LOG` wins.
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct RawThreema {
    /// Gateway ID (8 characters)
    pub gateway_id: String,

    /// Gateway secret (from the Gateway website)
    pub gateway_secret: String,

    /// Private key (32 bytes as lowercase hex string)
    pub private_key: String,

    /// List of recipients (Threema IDs)
    pub recipients: Vec<String>,
}

#[derive(Debug)]
pub struct Config {
    pub serial: Option<Serial>,
    pub monitor: MonitorConfig,
    pub logging: Logging,
    pub threema: Option<Threema>,
}

#[derive(Debug)]
pub struct Threema {
    /// Gateway ID (8 characters)
    pub gateway_id: String,

    /// Gateway secret (from the Gateway website)
    pub gateway_secret: String,

    /// Private key
    pub private_key: SecretKey,

    /// List of recipients (Threema IDs)
    pub recipients: Vec<String>,
}

impl TryFrom<RawMonitor> for MonitorConfig {
    type Error = anyhow::Error;

    fn try_from(raw: RawMonitor) -> Result<Self, Self::Error> {
        let thresholds = Thresholds::new(raw.dark_threshold, raw.bright_threshold).ok_or(
            anyhow::anyhow!(
                "Invalid thresholds: dark ({}) must be below bright ({}) and both must be finite",
                raw.dark_threshold,
                raw.bright_threshold
            ),
        )?;
        let alert = AlertConfig::new(SlotId(raw.alert_slot), &raw.alert_title).ok_or(
            anyhow::anyhow!(
                "Alert title is too long (max {} bytes)",
                light_monitor::alert::ALERT_TITLE_BYTES
            ),
        )?;
        Ok(MonitorConfig { thresholds, alert })
    }
}

impl TryFrom<RawConfig> for Config {
    type Error = anyhow::Error;

    fn try_from(raw_config: RawConfig) -> Result<Self, Self::Error> {
        let monitor =
            MonitorConfig::try_from(raw_config.monitor).context("Invalid monitor config")?;

        // Validate RawThreema config
        let threema = match raw_config.threema {
            Some(raw_threema) => {
                let private_key = SecretKey::from_slice(
                    HEXLOWER_PERMISSIVE
                        .decode(raw_threema.private_key.as_bytes())
                        .context("Could not decode Threema private key hex string")?
                        .as_ref(),
                )
                .ok_or(anyhow::anyhow!("Invalid Threema private key"))?;
                if raw_threema.recipients.is_empty() {
                    anyhow::bail!("Threema config must list at least one recipient");
                }
                Some(Threema {
                    gateway_id: raw_threema.gateway_id,
                    gateway_secret: raw_threema.gateway_secret,
                    private_key,
                    recipients: raw_threema.recipients,
                })
            }
            None => None,
        };

        Ok(Config {
            serial: raw_config.serial,
            monitor,
            logging: raw_config.logging,
            threema,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_example_roundtrip() {
        let example = RawConfig::example();
        let serialized = toml::to_string(&example).unwrap();
        let parsed: RawConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, example);
    }

    #[test]
    fn test_minimal_config() {
        let raw: RawConfig = toml::from_str("").unwrap();
        assert_eq!(raw.serial, None);
        assert_eq!(raw.monitor, RawMonitor::default());
        assert_eq!(raw.logging.level, "info");

        let config: Config = raw.try_into().unwrap();
        assert_eq!(config.monitor, MonitorConfig::default());
        assert!(config.threema.is_none());
    }

    #[test]
    fn test_partial_monitor_section() {
        let raw: RawConfig = toml::from_str(
            r#"
            [monitor]
            bright_threshold = 500.0
            alert_slot = 7
            "#,
        )
        .unwrap();
        let config: Config = raw.try_into().unwrap();
        assert_eq!(config.monitor.thresholds.dark(), 10.0);
        assert_eq!(config.monitor.thresholds.bright(), 500.0);
        assert_eq!(config.monitor.alert.slot(), SlotId(7));
        assert_eq!(config.monitor.alert.title(), "Light Level Notification");
    }

    #[test]
    fn test_reject_inverted_thresholds() {
        let raw: RawConfig = toml::from_str(
            r#"
            [monitor]
            dark_threshold = 300.0
            bright_threshold = 200.0
            "#,
        )
        .unwrap();
        let result: anyhow::Result<Config> = raw.try_into();
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("Invalid thresholds"), "{}", msg);
    }

    #[test]
    fn test_reject_long_title() {
        let raw = RawConfig {
            serial: None,
            monitor: RawMonitor {
                alert_title: "t".repeat(100),
                ..Default::default()
            },
            logging: Logging::default(),
            threema: None,
        };
        let result: anyhow::Result<Config> = raw.try_into();
        assert!(result.is_err());
    }

    #[test]
    fn test_reject_bad_threema_key() {
        // The example key is a placeholder and not valid hex
        let raw = RawConfig::example();
        let result: anyhow::Result<Config> = raw.try_into();
        let msg = format!("{:#}", result.unwrap_err());
        assert!(msg.contains("Threema private key"), "{}", msg);
    }

    #[test]
    fn test_valid_threema_key() {
        let mut raw = RawConfig::example();
        if let Some(threema) = raw.threema.as_mut() {
            threema.private_key = "ab".repeat(32);
        }
        let config: Config = raw.try_into().unwrap();
        let threema = config.threema.unwrap();
        assert_eq!(threema.gateway_id, "*YOUR_ID");
        assert_eq!(threema.recipients.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [serial]
            port = "/dev/ttyUSB1"
            baudrate = 115200

            [logging]
            level = "debug"
            "#
        )
        .unwrap();
        let raw = RawConfig::load(file.path()).unwrap();
        let serial = raw.serial.unwrap();
        assert_eq!(serial.port, PathBuf::from("/dev/ttyUSB1"));
        assert_eq!(serial.baudrate, 115200);
        assert_eq!(raw.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        let err = RawConfig::load(Path::new("/nonexistent/light-observer.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open config file"));
    }
}
