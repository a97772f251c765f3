use serde::Deserialize;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// The configuration file that is read if no other file is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
/// The address to bind to, if it is not configured.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// The port to listen on, if it is not configured.
pub const DEFAULT_PORT: u16 = 8080;

/// A custom error describing the error cases for loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file cannot be read.
    #[error("cannot read config file {0}: {1}")]
    CannotRead(PathBuf, std::io::Error),
    /// The configuration file is not a valid TOML file or has the wrong types.
    #[error("invalid config file {0}: {1}")]
    Invalid(PathBuf, toml::de::Error),
    /// There was no directory given where the repositories are.
    #[error("HookPath is not set, set it in the config file or with --hook-path")]
    MissingHookPath,
}

/// One source of configuration, every value is optional.
///
/// The keys in the file are the same as the field names of the configuration
/// (`HookPath`, `Host` and `Port`), unknown keys are ignored.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
pub struct ConfigLayer {
    #[serde(rename = "HookPath")]
    pub hook_path: Option<PathBuf>,
    #[serde(rename = "Host")]
    pub host: Option<String>,
    #[serde(rename = "Port")]
    pub port: Option<u16>,
}

impl ConfigLayer {
    /// Parse a layer from the contents of a TOML file.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|err| ConfigError::Invalid(path.to_path_buf(), err))
    }

    /// Read and parse a TOML file.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            read_to_string(path).map_err(|err| ConfigError::CannotRead(path.to_path_buf(), err))?;
        Self::parse(path, &contents)
    }

    /// Put the other layer on top of this one, every value set in the other wins.
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            hook_path: other.hook_path.or(self.hook_path),
            host: other.host.or(self.host),
            port: other.port.or(self.port),
        }
    }
}

/// The configuration of the daemon, loaded once on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// The directory under which repositories are looked up by the request path.
    pub hook_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Create a configuration with the default host and port.
    pub fn new(hook_path: PathBuf) -> Self {
        Config {
            hook_path,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Load the configuration from the given file (or from `config.toml` if it
    /// exists) and apply the overrides on top of it.
    pub fn load(file: Option<&Path>, overrides: ConfigLayer) -> Result<Self, ConfigError> {
        let base = match file {
            Some(path) => ConfigLayer::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                ConfigLayer::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => ConfigLayer::default(),
        };

        Self::try_from(base.merge(overrides))
    }

    /// The address for the HTTP server, in the form of `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TryFrom<ConfigLayer> for Config {
    type Error = ConfigError;

    fn try_from(layer: ConfigLayer) -> Result<Self, Self::Error> {
        let hook_path = layer.hook_path.ok_or(ConfigError::MissingHookPath)?;

        Ok(Config {
            hook_path,
            host: layer.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: layer.port.unwrap_or(DEFAULT_PORT),
        })
    }
}
