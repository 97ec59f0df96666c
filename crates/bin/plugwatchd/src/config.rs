//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `plugwatch.toml` in the working directory, or at the path named
//! by `PLUGWATCH_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use plugwatch_domain::settings::FleetSettings;

const DEFAULT_PATH: &str = "plugwatch.toml";
const DEFAULT_FILTER: &str = "plugwatchd=info,plugwatch=info,tower_http=debug";
const DEBUG_FILTER: &str = "plugwatchd=debug,plugwatch=debug,tower_http=debug";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Event bus settings.
    pub events: EventsConfig,
    /// Plug driver selection.
    pub driver: DriverConfig,
    /// Plugs and coordinator behaviour, applied live on reload.
    pub fleet: FleetSettings,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax). Empty means the built-in default.
    pub filter: String,
    /// Raise the built-in default to debug.
    pub debug: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Per-subscriber buffer of the event bus.
    pub capacity: usize,
}

/// Which plug driver backs the coordinator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// In-memory simulated plugs.
    #[default]
    Virtual,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub kind: DriverKind,
    /// Simulated round-trip latency per call.
    pub latency_ms: u64,
    /// Addresses the virtual driver refuses to answer.
    pub unreachable: Vec<String>,
}

impl DriverConfig {
    #[must_use]
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl LoggingConfig {
    /// Filter directive handed to `tracing-subscriber`.
    #[must_use]
    pub fn effective_filter(&self) -> &str {
        if !self.filter.is_empty() {
            &self.filter
        } else if self.debug {
            DEBUG_FILTER
        } else {
            DEFAULT_FILTER
        }
    }
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&Self::path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Path of the config file, honouring `PLUGWATCH_CONFIG`.
    #[must_use]
    pub fn path() -> PathBuf {
        std::env::var_os("PLUGWATCH_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_PATH), PathBuf::from)
    }

    fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PLUGWATCH_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("PLUGWATCH_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("PLUGWATCH_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Ok(val) = std::env::var("PLUGWATCH_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.events.capacity == 0 {
            return Err(ConfigError::Validation(
                "event capacity must be non-zero".to_string(),
            ));
        }
        self.fleet
            .validate()
            .map_err(|err| ConfigError::Validation(err.to_string()))
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use plugwatch_domain::plug::PlugAddress;

    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.events.capacity, 256);
        assert_eq!(config.driver.kind, DriverKind::Virtual);
        assert!(config.fleet.plugs.is_empty());
        assert_eq!(config.fleet.shutdown.abort_timeout_secs, 30);
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [logging]
            filter = 'debug'

            [events]
            capacity = 64

            [driver]
            kind = 'virtual'
            latency_ms = 20
            unreachable = ['10.0.0.9']

            [fleet]
            polling_enabled = true
            polling_interval_minutes = 5
            command_timeout_secs = 3
            startup_power_on = true
            upload_power_on = true

            [fleet.shutdown]
            enabled = true
            abort_timeout_secs = 10
            idle_ignore_commands = ['M105', 'M27']
            idle_timeout_wait_temp = 45.0

            [fleet.thermal]
            enabled = true
            max_bed = 110.0

            [[fleet.plugs]]
            address = '10.0.0.5'
            label = 'Printer'
            automatic_shutdown = true
            gcode_enabled = true
            power_on_at_upload = true

            [[fleet.plugs]]
            address = '10.0.0.6'
        ";
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.events.capacity, 64);
        assert_eq!(config.driver.latency(), Duration::from_millis(20));
        assert_eq!(config.driver.unreachable, ["10.0.0.9"]);
        assert_eq!(
            config.fleet.polling_interval(),
            Some(Duration::from_secs(300))
        );
        assert!(config.fleet.startup_power_on);
        assert!(config.fleet.shutdown.enabled);
        assert_eq!(config.fleet.shutdown.abort_timeout_secs, 10);
        assert_eq!(config.fleet.shutdown.idle_timeout_minutes, 30);
        assert!((config.fleet.shutdown.idle_timeout_wait_temp - 45.0).abs() < f64::EPSILON);
        assert!(config.fleet.upload_power_on);
        assert!(config.fleet.thermal.enabled);
        assert_eq!(config.fleet.plugs.len(), 2);
        let printer = &config.fleet.plugs[0];
        assert_eq!(printer.address, PlugAddress::new("10.0.0.5"));
        assert_eq!(printer.label, "Printer");
        assert!(printer.policy.automatic_shutdown);
        assert!(printer.policy.gcode_enabled);
        assert!(printer.policy.power_on_at_upload);
        assert!(!config.fleet.plugs[1].policy.automatic_shutdown);
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file(std::path::Path::new("nonexistent.toml")).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_duplicate_plug_addresses() {
        let toml = "
            [[fleet.plugs]]
            address = '10.0.0.5'

            [[fleet.plugs]]
            address = '10.0.0.5'
        ";
        let config = Config::parse(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_zero_command_timeout() {
        let config = Config::parse("[fleet]\ncommand_timeout_secs = 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_abort_timeout() {
        let config = Config::parse("[fleet.shutdown]\nabort_timeout_secs = 0").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_accept_valid_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn should_format_custom_bind_addr() {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 9090;
        assert_eq!(config.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn should_use_default_filter_when_unset() {
        assert_eq!(LoggingConfig::default().effective_filter(), DEFAULT_FILTER);
    }

    #[test]
    fn should_use_debug_filter_when_debug_enabled() {
        let logging = LoggingConfig {
            filter: String::new(),
            debug: true,
        };
        assert_eq!(logging.effective_filter(), DEBUG_FILTER);
    }

    #[test]
    fn should_prefer_explicit_filter_over_debug_flag() {
        let logging = LoggingConfig {
            filter: "warn".to_string(),
            debug: true,
        };
        assert_eq!(logging.effective_filter(), "warn");
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        assert!(matches!(
            Config::parse("invalid {{{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn should_reject_unknown_driver_kind() {
        assert!(Config::parse("[driver]\nkind = 'zigbee'").is_err());
    }
}
