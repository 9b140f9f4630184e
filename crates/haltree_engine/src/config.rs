use std::path::Path;

use haltree_base::{ErrorKind, HaltreeError, HaltreeResult, HttpServerConfig};
use serde::Deserialize;
use tracing::debug;

/// Configuration for a haltree server, read from `haltree.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface to listen on.
    pub host: String,
    pub port: u16,
    /// Value of the `Server` response header.
    pub server_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            server_name: "haltree".to_string(),
        }
    }
}

impl Config {
    pub fn http_server_config(&self) -> HttpServerConfig {
        HttpServerConfig::new(self.host.clone())
            .with_port(self.port)
            .with_server_name(self.server_name.clone())
    }
}

/// Load a configuration file. A missing or malformed file is an error.
pub fn load_config(path: &Path) -> HaltreeResult<Config> {
    let contents = std::fs::read_to_string(path).map_err(|source| {
        HaltreeError::new(ErrorKind::FileError {
            path: path.to_path_buf(),
            source,
        })
    })?;
    let config = toml::from_str(&contents).map_err(|e| {
        HaltreeError::message(format!("Invalid configuration: {}", e))
            .context(format!("Loading {}", path.display()))
    })?;
    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Load a configuration file, falling back to the defaults if it does not exist.
pub fn load_config_or_default(path: &Path) -> HaltreeResult<Config> {
    if !path.exists() {
        debug!(path = %path.display(), "no configuration file, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}
