//! Configuration file resolution and TOML loading
//!
//! Bootstrap config is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<config dir>/tvcast/<module>.toml` if it exists
//! 4. Built-in defaults (fallback)
//!
//! A missing file only fails startup when it was named explicitly.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the hub config file
pub const CONFIG_ENV_VAR: &str = "TVCAST_CONFIG";

/// Where the bootstrap configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Named on the command line or in the environment; must exist
    Explicit(PathBuf),
    /// Found in the platform config directory
    Discovered(PathBuf),
    /// No file; use built-in defaults
    Defaults,
}

/// Resolve the config file location for a module
pub fn resolve_config_location(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    module_name: &str,
) -> ConfigLocation {
    if let Some(path) = cli_arg {
        return ConfigLocation::Explicit(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return ConfigLocation::Explicit(PathBuf::from(path));
        }
    }

    match default_config_path(module_name) {
        Some(path) if path.exists() => ConfigLocation::Discovered(path),
        _ => ConfigLocation::Defaults,
    }
}

/// Platform config file path for a module (may not exist)
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tvcast").join(format!("{}.toml", module_name)))
}

/// OS-dependent data folder for databases and scratch files
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tvcast"))
        .unwrap_or_else(|| PathBuf::from("./tvcast_data"))
}

/// Load a TOML config from the resolved location
pub fn load_toml_config<T>(location: &ConfigLocation) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match location {
        ConfigLocation::Explicit(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            parse_toml_file(path)
        }
        ConfigLocation::Discovered(path) => parse_toml_file(path),
        ConfigLocation::Defaults => {
            warn!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}

fn parse_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}
