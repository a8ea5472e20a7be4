//! Configuration for dusklight.
//!
//! Everything is optional. The file lives at `$XDG_CONFIG_HOME/dusklight/dusklight.toml`
//! and a missing file simply means defaults:
//!
//! ```toml
//! latitude = 52.52          # Static fallback location, used until GeoClue answers
//! longitude = 13.405        # (both or neither)
//! use_geoclue = true        # Ask GeoClue for the current location
//! desktop_id = "dusklight"  # DesktopId presented to GeoClue
//! dbus_server = true        # Publish the mode as org.dusklight.Dusklight
//! portal = true             # Serve color-scheme to xdg-desktop-portal
//! debug = false             # Show debug log lines
//! ```
//!
//! Environment variables override the file: `DUSKLIGHT_LAT`, `DUSKLIGHT_LNG`,
//! `DUSKLIGHT_USEGEOCLUE`, `DUSKLIGHT_DBUSSERVER`, `DUSKLIGHT_PORTAL` and
//! `DUSKLIGHT_DEBUG`.

pub mod loading;
pub mod validation;

use serde::Deserialize;

use crate::common::constants::*;
use crate::common::logger::Log;
use crate::common::utils::private_path;
use crate::geo::location::Location;

pub use loading::{get_config_path, load, load_from_path};
pub use validation::validate_config;

/// Parsed configuration. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Static fallback latitude in degrees (-90 to +90)
    pub latitude: Option<f64>,
    /// Static fallback longitude in degrees (-180 to +180)
    pub longitude: Option<f64>,
    pub use_geoclue: Option<bool>,
    pub desktop_id: Option<String>,
    pub dbus_server: Option<bool>,
    pub portal: Option<bool>,
    pub debug: Option<bool>,
}

impl Config {
    /// Load from the default path with environment overrides applied.
    pub fn load() -> anyhow::Result<Self> {
        load()
    }

    /// The configured static location, if both coordinates are set.
    pub fn static_location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Location::new(lat, lng).ok(),
            _ => None,
        }
    }

    pub fn use_geoclue(&self) -> bool {
        self.use_geoclue.unwrap_or(DEFAULT_USE_GEOCLUE)
    }

    pub fn desktop_id(&self) -> &str {
        self.desktop_id.as_deref().unwrap_or(DEFAULT_DESKTOP_ID)
    }

    pub fn dbus_server(&self) -> bool {
        self.dbus_server.unwrap_or(DEFAULT_DBUS_SERVER)
    }

    pub fn portal(&self) -> bool {
        self.portal.unwrap_or(DEFAULT_PORTAL)
    }

    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(DEFAULT_DEBUG)
    }

    pub fn log_config(&self, log: &Log) {
        log_block_start!(log, "Configuration");
        if let Ok(path) = get_config_path() {
            let state = if path.exists() { "" } else { " (not present, using defaults)" };
            log_indented!(log, "File: {}{state}", private_path(&path));
        }
        match self.static_location() {
            Some(location) => log_indented!(log, "Static location: {location}"),
            None => log_indented!(log, "Static location: none"),
        }
        log_indented!(log, "GeoClue: {}", on_off(self.use_geoclue()));
        if self.use_geoclue() {
            log_indented!(log, "Desktop ID: {}", self.desktop_id());
        }
        log_indented!(log, "Mode service: {}", on_off(self.dbus_server()));
        log_indented!(log, "Settings portal: {}", on_off(self.portal()));
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

#[cfg(test)]
mod tests;
