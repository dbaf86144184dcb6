mod defaults;
mod io;
mod types;
mod validation;

pub use defaults::*;
pub use io::*;
pub use types::*;
pub use validation::*;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level fleetpolicy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub fleet: FleetConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file, environment, and defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

        let mut config = match config_path {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                read_config_file(&path)?
            }
            Some(path) => anyhow::bail!("Config file '{}' does not exist", path.display()),
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Write default configuration to a file.
    pub fn write_default(path: &Path) -> Result<()> {
        write_config_file(path, &Config::default())
    }

    /// Path of the private state database.
    pub fn state_path(&self) -> PathBuf {
        self.state
            .path
            .clone()
            .unwrap_or_else(|| resolve_state_dir().join(STATE_DB_FILENAME))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("FLEETPOLICY_ENDPOINT") {
            self.fleet.endpoint = endpoint;
        }

        if let Ok(key) = std::env::var("FLEETPOLICY_API_KEY") {
            self.fleet.api_key = Some(key);
        }

        if let Ok(user) = std::env::var("FLEETPOLICY_USERNAME") {
            self.fleet.username = Some(user);
        }

        if let Ok(password) = std::env::var("FLEETPOLICY_PASSWORD") {
            self.fleet.password = Some(password);
        }

        if let Ok(space) = std::env::var("FLEETPOLICY_SPACE") {
            self.fleet.space_id = Some(space);
        }
    }
}

/// Find the configuration file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("fleetpolicy.json"),
        PathBuf::from("fleetpolicy.yaml"),
        PathBuf::from("fleetpolicy.yml"),
        PathBuf::from("fleetpolicy.toml"),
    ];

    if let Some(found) = candidates.iter().find(|p| p.exists()) {
        return Some(found.clone());
    }

    let home_config = dirs::home_dir()?.join(".fleetpolicy").join("config.json");
    home_config.exists().then_some(home_config)
}

/// Resolve the state directory for persistent data.
fn resolve_state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FLEETPOLICY_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|h| h.join(".fleetpolicy"))
        .unwrap_or_else(|| PathBuf::from(".fleetpolicy"))
}
