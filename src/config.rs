use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NodeError, Result};

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Split `.env` content into key/value pairs, skipping comments and blank lines.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key, value));
        }
    }

    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub matter: MatterConfig,
    pub sensors: SensorDefaults,
    pub storage: StorageConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatterConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_name: String,
    pub discriminator: u16,
    pub passcode: u32,
    /// Numeric device identifier, published as the BasicInformation serial number
    pub device_id: u16,
    /// Network interface to bind and advertise on (auto-detected when unset)
    pub interface: Option<String>,
}

/// Values pushed to each endpoint before and right after the stack starts.
///
/// Units follow the Matter clusters: centidegrees Celsius, 0.1 kPa and
/// centi-percent relative humidity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorDefaults {
    pub temperature_centi_celsius: i16,
    pub pressure_deci_kpa: i16,
    pub humidity_centi_percent: u16,
    pub battery_percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `nvs.json` and `matter.bin`
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seconds between simulated readings, 0 disables the simulation
    pub interval_secs: u64,
}

/// Discriminators are 12 bits wide
const MAX_DISCRIMINATOR: u16 = 0x0FFF;
/// Largest passcode allowed by the setup code format
const MAX_PASSCODE: u32 = 99_999_998;
/// Passcodes Matter forbids because they are trivial to guess
const INVALID_PASSCODES: [u32; 12] = [
    0, 11_111_111, 22_222_222, 33_333_333, 44_444_444, 55_555_555, 66_666_666, 77_777_777,
    88_888_888, 99_999_999, 12_345_678, 87_654_321,
];

/// Directory for persistence data, relative to the home directory
const STORAGE_DIR: &str = ".config/matter-sensor-node";

fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STORAGE_DIR)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            matter: MatterConfig {
                vendor_id: 0xFFF1,
                product_id: 0x8000,
                device_name: "Matter Sensor Node".to_string(),
                discriminator: 3840,
                passcode: 20202021,
                device_id: 1,
                interface: None,
            },
            sensors: SensorDefaults {
                temperature_centi_celsius: 2200,
                pressure_deci_kpa: 1013,
                humidity_centi_percent: 4500,
                battery_percent: 100,
            },
            storage: StorageConfig {
                dir: default_storage_dir(),
            },
            simulation: SimulationConfig { interval_secs: 30 },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load a JSON config file, then apply environment overrides on top.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let mut config: Config = serde_json::from_slice(&data)?;
        config.apply_env();
        Ok(config)
    }

    /// Reject commissioning parameters no controller would accept.
    pub fn validate(&self) -> Result<()> {
        let matter = &self.matter;
        if matter.discriminator > MAX_DISCRIMINATOR {
            return Err(NodeError::InvalidConfig(format!(
                "discriminator {} exceeds {}",
                matter.discriminator, MAX_DISCRIMINATOR
            )));
        }
        if matter.passcode > MAX_PASSCODE || INVALID_PASSCODES.contains(&matter.passcode) {
            return Err(NodeError::InvalidConfig(format!(
                "passcode {:08} is not allowed",
                matter.passcode
            )));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(name) = std::env::var("DEVICE_NAME") {
            self.matter.device_name = name;
        }
        if let Ok(discriminator) = std::env::var("MATTER_DISCRIMINATOR")
            && let Ok(d) = discriminator.parse()
        {
            self.matter.discriminator = d;
        }
        if let Ok(passcode) = std::env::var("MATTER_PASSCODE")
            && let Ok(p) = passcode.parse()
        {
            self.matter.passcode = p;
        }
        if let Ok(device_id) = std::env::var("MATTER_DEVICE_ID")
            && let Ok(id) = device_id.parse()
        {
            self.matter.device_id = id;
        }
        if let Ok(interface) = std::env::var("MATTER_INTERFACE") {
            self.matter.interface = Some(interface);
        }

        // Sensor defaults
        if let Ok(value) = std::env::var("DEFAULT_TEMPERATURE")
            && let Ok(v) = value.parse()
        {
            self.sensors.temperature_centi_celsius = v;
        }
        if let Ok(value) = std::env::var("DEFAULT_PRESSURE")
            && let Ok(v) = value.parse()
        {
            self.sensors.pressure_deci_kpa = v;
        }
        if let Ok(value) = std::env::var("DEFAULT_HUMIDITY")
            && let Ok(v) = value.parse()
        {
            self.sensors.humidity_centi_percent = v;
        }
        if let Ok(value) = std::env::var("DEFAULT_BATTERY")
            && let Ok(v) = value.parse()
        {
            self.sensors.battery_percent = v;
        }

        if let Ok(dir) = std::env::var("NODE_STORAGE_DIR") {
            self.storage.dir = PathBuf::from(dir);
        }
        if let Ok(interval) = std::env::var("SENSOR_SIM_INTERVAL_SECS")
            && let Ok(secs) = interval.parse()
        {
            self.simulation.interval_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_skips_comments_and_strips_quotes() {
        let content = "# comment\n\nDEVICE_NAME=\"Kitchen Node\"\nMATTER_PASSCODE = 12345678\nBROKEN\n";
        let pairs = parse_dotenv(content);
        assert_eq!(
            pairs,
            vec![("DEVICE_NAME", "Kitchen Node"), ("MATTER_PASSCODE", "12345678")]
        );
    }

    #[test]
    fn test_parse_dotenv_keeps_single_quote_character() {
        let pairs = parse_dotenv("KEY=\"");
        assert_eq!(pairs, vec![("KEY", "\"")]);
    }

    #[test]
    fn test_defaults_are_within_sensor_ranges() {
        let config = Config::default();
        assert!(config.sensors.humidity_centi_percent <= 10000);
        assert!(config.sensors.battery_percent <= 100);
        assert_ne!(config.matter.device_id, 0);
        assert_eq!(config.simulation.interval_secs, 30);
    }

    #[test]
    fn test_validate_commissioning_parameters() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.matter.discriminator = 4095;
        assert!(config.validate().is_ok());
        config.matter.discriminator = 4096;
        assert!(matches!(config.validate(), Err(NodeError::InvalidConfig(_))));

        config.matter.discriminator = 3840;
        for passcode in [0, 11111111, 12345678, 87654321, 99999999, 100000000] {
            config.matter.passcode = passcode;
            assert!(
                matches!(config.validate(), Err(NodeError::InvalidConfig(_))),
                "passcode {} accepted",
                passcode
            );
        }

        config.matter.passcode = 1;
        assert!(config.validate().is_ok());
        config.matter.passcode = 99999998;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");

        let mut config = Config::default();
        config.matter.device_name = "Attic".to_string();
        config.sensors.pressure_deci_kpa = 998;
        fs::write(&path, serde_json::to_vec(&config).unwrap()).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.sensors.pressure_deci_kpa, 998);
        assert_eq!(loaded.matter.vendor_id, 0xFFF1);
    }
}
