//! Configuration struct with sensible defaults, inline parsing, and RON
//! persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::declarations::parse_declarations;
use crate::error::ConfigError;

/// Broadcast tick interval used when none is configured.
pub const DEFAULT_INTERVAL: f64 = 10.0;

/// Connection and synchronization settings for one client.
///
/// Field names follow the remote store's conventional camelCase keys so the
/// same names work in RON files and inline declaration strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// API key presented to the remote store.
    pub api_key: String,
    /// Authentication domain of the remote store.
    pub auth_domain: String,
    /// Synchronization channel. Empty means "use the default channel".
    pub channel: String,
    /// Root URL of the remote database.
    #[serde(rename = "databaseURL")]
    pub database_url: String,
    /// Minimum time between two broadcast passes, in host clock units.
    pub interval: f64,
    /// Storage bucket of the remote store.
    pub storage_bucket: String,
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            auth_domain: String::new(),
            channel: String::new(),
            database_url: String::new(),
            interval: DEFAULT_INTERVAL,
            storage_bucket: String::new(),
            log_level: "info".to_string(),
        }
    }
}

/// Where a client's configuration comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Already-structured settings.
    Structured(Config),
    /// An inline `key: value; key: value` string that still needs parsing.
    Inline(String),
}

impl ConfigSource {
    /// Produces the usable configuration, if any.
    ///
    /// Returns `Ok(None)` for an inline string without declarations: there is
    /// nothing to connect with.
    pub fn resolve(&self) -> Result<Option<Config>, ConfigError> {
        match self {
            ConfigSource::Structured(config) => {
                config.validate()?;
                Ok(Some(config.clone()))
            }
            ConfigSource::Inline(text) => Config::parse_inline(text),
        }
    }
}

impl From<Config> for ConfigSource {
    fn from(config: Config) -> Self {
        ConfigSource::Structured(config)
    }
}

impl From<&str> for ConfigSource {
    fn from(text: &str) -> Self {
        ConfigSource::Inline(text.to_string())
    }
}

// --- Inline parsing ---

impl Config {
    /// Parses an inline declaration string such as
    /// `"channel: room1; interval: 20"`.
    ///
    /// Unrecognized keys are ignored. Keys that are absent keep their
    /// defaults. Returns `Ok(None)` when the string holds no declarations.
    pub fn parse_inline(text: &str) -> Result<Option<Self>, ConfigError> {
        let declarations = parse_declarations(text);
        if declarations.is_empty() {
            return Ok(None);
        }

        let mut config = Config::default();
        for (key, value) in declarations {
            match key.as_str() {
                "apiKey" => config.api_key = value,
                "authDomain" => config.auth_domain = value,
                "channel" => config.channel = value,
                "databaseURL" => config.database_url = value,
                "storageBucket" => config.storage_bucket = value,
                "logLevel" => config.log_level = value,
                "interval" => {
                    config.interval = value
                        .parse::<f64>()
                        .ok()
                        .filter(|interval| interval.is_finite() && *interval >= 0.0)
                        .ok_or_else(|| ConfigError::InvalidValue {
                            key: key.clone(),
                            value: value.clone(),
                        })?;
                }
                _ => log::debug!("Ignoring unknown config key `{key}`"),
            }
        }
        Ok(Some(config))
    }

    /// Checks the values the inline grammar would have refused: the tick
    /// interval must be finite and non-negative.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_finite() && self.interval >= 0.0 {
            return Ok(());
        }
        Err(ConfigError::InvalidValue {
            key: "interval".to_string(),
            value: self.interval.to_string(),
        })
    }
}

// --- Load / Save / Reload ---

/// Default directory holding `config.ron`, under the platform config dir.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scenecast"))
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new().depth_limit(2);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
