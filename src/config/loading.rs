//! Configuration loading: file, then environment overrides, then validation.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::Config;
use super::validation::validate_config;
use crate::common::constants::*;
use crate::common::utils::private_path;

/// `$XDG_CONFIG_HOME/dusklight/dusklight.toml`
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(APP_NAME).join(CONFIG_FILE_NAME))
}

/// Load the configuration from the default path.
pub fn load() -> Result<Config> {
    load_from_path(&get_config_path()?)
}

/// Load the configuration from `path`, apply environment overrides and validate.
///
/// A missing file yields the defaults; the environment still applies.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", private_path(path)))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", private_path(path)))?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config).with_context(|| {
        format!("Invalid configuration in {}", private_path(path))
    })?;

    Ok(config)
}

/// Overwrite fields from `DUSKLIGHT_*` environment variables that are set.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(lat) = env_value::<f64>(ENV_LATITUDE)? {
        config.latitude = Some(lat);
    }
    if let Some(lng) = env_value::<f64>(ENV_LONGITUDE)? {
        config.longitude = Some(lng);
    }
    if let Some(raw) = env_raw(ENV_USE_GEOCLUE) {
        config.use_geoclue = Some(parse_bool(ENV_USE_GEOCLUE, &raw)?);
    }
    if let Some(raw) = env_raw(ENV_DBUS_SERVER) {
        config.dbus_server = Some(parse_bool(ENV_DBUS_SERVER, &raw)?);
    }
    if let Some(raw) = env_raw(ENV_PORTAL) {
        config.portal = Some(parse_bool(ENV_PORTAL, &raw)?);
    }
    if let Some(raw) = env_raw(ENV_DEBUG) {
        config.debug = Some(parse_bool(ENV_DEBUG, &raw)?);
    }
    Ok(())
}

// Unset and empty are treated the same.
fn env_raw(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_raw(name)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("{name}={raw:?} is not a valid value"))
        })
        .transpose()
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{name}={raw:?} is not a boolean (use true or false)"),
    }
}
