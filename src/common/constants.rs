//! Application constants and default values for dusklight.
//!
//! This module contains the configuration defaults, validation limits,
//! file names and operational constants used throughout the application.

use std::time::Duration;

// ═══ Application Identity ═══

pub const APP_NAME: &str = "dusklight";

// ═══ Application Configuration Defaults ═══
// These values are used when config options are not specified by the user

pub const DEFAULT_USE_GEOCLUE: bool = true;
pub const DEFAULT_DESKTOP_ID: &str = "dusklight"; // Written to GeoClue's DesktopId property
pub const DEFAULT_DEBUG: bool = false;
pub const DEFAULT_DBUS_SERVER: bool = true; // Publish the mode on the session bus
pub const DEFAULT_PORTAL: bool = true; // Act as the xdg-desktop-portal Settings backend

// ═══ File Locations ═══
// Relative to the XDG base directories

pub const CONFIG_FILE_NAME: &str = "dusklight.toml"; // $XDG_CONFIG_HOME/dusklight/
pub const CACHE_FILE_NAME: &str = "location.json"; // $XDG_CACHE_HOME/dusklight/
pub const LOCK_FILE_NAME: &str = "dusklight.lock"; // $XDG_RUNTIME_DIR/
pub const FALLBACK_RUNTIME_DIR: &str = "/tmp";
pub const DEFAULT_DATA_DIRS: &str = "/usr/local/share:/usr/share";

// ═══ Environment Overrides ═══

pub const ENV_LATITUDE: &str = "DUSKLIGHT_LAT";
pub const ENV_LONGITUDE: &str = "DUSKLIGHT_LNG";
pub const ENV_USE_GEOCLUE: &str = "DUSKLIGHT_USEGEOCLUE";
pub const ENV_DEBUG: &str = "DUSKLIGHT_DEBUG";
pub const ENV_DBUS_SERVER: &str = "DUSKLIGHT_DBUSSERVER";
pub const ENV_PORTAL: &str = "DUSKLIGHT_PORTAL";

// ═══ Validation Limits ═══

pub const MINIMUM_LATITUDE: f64 = -90.0;
pub const MAXIMUM_LATITUDE: f64 = 90.0;
pub const MINIMUM_LONGITUDE: f64 = -180.0;
pub const MAXIMUM_LONGITUDE: f64 = 180.0;

// ═══ Solar Calculation ═══

pub const MAX_DAY_LOOKAHEAD: u32 = 3; // Days searched before giving up on a transition
pub const CIVIL_TWILIGHT_ALTITUDE: f64 = -6.0; // Degrees, sun centre below the horizon
pub const TWILIGHT_GUARD_MARGIN: f64 = 0.5; // Degrees, slack for the approximate declination
pub const MAX_EVENT_DRIFT_HOURS: i64 = 18; // Solar events further than this from solar noon are rejected

// ═══ Operational Timing Constants ═══

pub const MAX_IDLE_WAIT: Duration = Duration::from_secs(60); // Longest single event loop wait
pub const CALCULATION_RETRY_MINUTES: i64 = 60; // Wait before recomputing after a failed calculation

// ═══ D-Bus Names ═══

pub const GEOCLUE_SERVICE: &str = "org.freedesktop.GeoClue2";
pub const GEOCLUE_MANAGER_PATH: &str = "/org/freedesktop/GeoClue2/Manager";
pub const GEOCLUE_LOCATION_IFACE: &str = "org.freedesktop.GeoClue2.Location";
pub const DBUS_PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

pub const MODE_SERVICE_NAME: &str = "org.dusklight.Dusklight"; // Also the interface name
pub const MODE_SERVICE_PATH: &str = "/org/dusklight/Dusklight";

pub const PORTAL_BUS_NAME: &str = "org.freedesktop.impl.portal.desktop.dusklight";
pub const PORTAL_OBJECT_PATH: &str = "/org/freedesktop/portal/desktop";
pub const PORTAL_SETTINGS_IFACE: &str = "org.freedesktop.impl.portal.Settings";
pub const PORTAL_SETTINGS_VERSION: u32 = 1;
pub const APPEARANCE_NAMESPACE: &str = "org.freedesktop.appearance";
pub const COLOR_SCHEME_KEY: &str = "color-scheme";
pub const STATUS_NAMESPACE: &str = "org.dusklight"; // Lets clients detect that dusklight backs the portal
pub const STATUS_KEY: &str = "status";

// ═══ Exit Codes ═══

pub const EXIT_FAILURE: i32 = 1; // General failure

// ═══ Test Constants ═══
// Common values used in tests for consistency
#[cfg(test)]
pub mod test_constants {
    pub const TEST_BERLIN_LATITUDE: f64 = 52.52;
    pub const TEST_BERLIN_LONGITUDE: f64 = 13.405;
    pub const TEST_TROMSO_LATITUDE: f64 = 69.6492;
    pub const TEST_TROMSO_LONGITUDE: f64 = 18.9553;
}
