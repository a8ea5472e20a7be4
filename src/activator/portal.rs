//! xdg-desktop-portal Settings backend.
//!
//! Applications using the Settings portal read `org.freedesktop.appearance`
//! `color-scheme` (0 no preference, 1 prefer dark, 2 prefer light) and listen for
//! `SettingChanged`. dusklight serves `org.freedesktop.impl.portal.Settings` under
//! `org.freedesktop.impl.portal.desktop.dusklight`, which the portal frontend consults
//! when `dusklight` is listed in the user's `portals.conf`.
//!
//! `org.dusklight` `status` reads `"running"`, so clients can tell the backend is live.

use anyhow::{Context, Result};
use std::collections::HashMap;
use zbus::blocking::Connection;
use zbus::names::BusName;
use zbus::zvariant::Value;

use super::{ModeActivator, SharedMode};
use crate::common::constants::{
    APPEARANCE_NAMESPACE, COLOR_SCHEME_KEY, PORTAL_BUS_NAME, PORTAL_OBJECT_PATH,
    PORTAL_SETTINGS_IFACE, PORTAL_SETTINGS_VERSION, STATUS_KEY, STATUS_NAMESPACE,
};
use crate::common::logger::Log;
use crate::core::mode::Mode;

type Settings = HashMap<String, HashMap<String, Value<'static>>>;

/// Errors returned to portal callers.
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.freedesktop.portal.Error")]
pub enum PortalError {
    #[zbus(error)]
    ZBus(zbus::Error),
    NotFound(String),
}

/// `color-scheme` value for `mode`.
pub fn color_scheme(mode: Option<Mode>) -> u32 {
    match mode {
        None => 0,
        Some(Mode::Dark) => 1,
        Some(Mode::Light) => 2,
    }
}

/// Answer a single `Read`. `None` for settings this backend does not provide.
pub fn read_setting(mode: Option<Mode>, namespace: &str, key: &str) -> Option<Value<'static>> {
    match (namespace, key) {
        (APPEARANCE_NAMESPACE, COLOR_SCHEME_KEY) => Some(Value::from(color_scheme(mode))),
        (STATUS_NAMESPACE, STATUS_KEY) => Some(Value::from("running")),
        _ => None,
    }
}

// A pattern matches a namespace exactly, or by prefix when it ends in `*`.
fn namespace_matches(pattern: &str, namespace: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => namespace.starts_with(prefix),
        None => pattern == namespace,
    }
}

/// Answer `ReadAll`. An empty pattern list selects every namespace.
pub fn read_all_settings(mode: Option<Mode>, patterns: &[String]) -> Settings {
    let provided = [
        (APPEARANCE_NAMESPACE, COLOR_SCHEME_KEY),
        (STATUS_NAMESPACE, STATUS_KEY),
    ];

    let mut settings = Settings::new();
    for (namespace, key) in provided {
        let wanted = patterns.is_empty()
            || patterns
                .iter()
                .any(|pattern| namespace_matches(pattern, namespace));
        if !wanted {
            continue;
        }
        if let Some(value) = read_setting(mode, namespace, key) {
            settings
                .entry(namespace.to_string())
                .or_default()
                .insert(key.to_string(), value);
        }
    }
    settings
}

/// The object served on the bus.
pub struct SettingsInterface {
    mode: SharedMode,
}

#[zbus::interface(name = "org.freedesktop.impl.portal.Settings")]
impl SettingsInterface {
    #[zbus(property)]
    fn version(&self) -> u32 {
        PORTAL_SETTINGS_VERSION
    }

    fn read(&self, namespace: &str, key: &str) -> Result<Value<'static>, PortalError> {
        read_setting(self.mode.get(), namespace, key)
            .ok_or_else(|| PortalError::NotFound(format!("{namespace} {key} not found")))
    }

    fn read_all(&self, namespaces: Vec<String>) -> Settings {
        read_all_settings(self.mode.get(), &namespaces)
    }
}

/// Owns the portal backend name on the session bus for the daemon's lifetime.
pub struct PortalSettings {
    connection: Connection,
    mode: SharedMode,
    log: Log,
}

impl PortalSettings {
    /// Connect to the session bus, export the Settings object and claim the backend name.
    pub fn start(log: Log) -> Result<Self> {
        let mode = SharedMode::default();
        let interface = SettingsInterface { mode: mode.clone() };

        let connection = zbus::blocking::connection::Builder::session()
            .context("failed to connect to the session bus")?
            .serve_at(PORTAL_OBJECT_PATH, interface)
            .context("failed to export the portal settings object")?
            .name(PORTAL_BUS_NAME)
            .context("invalid portal backend name")?
            .build()
            .with_context(|| format!("failed to claim {PORTAL_BUS_NAME}"))?;

        log_decorated!(log, "Serving the settings portal as {PORTAL_BUS_NAME}");

        Ok(Self {
            connection,
            mode,
            log,
        })
    }
}

impl ModeActivator for PortalSettings {
    fn name(&self) -> &'static str {
        "portal"
    }

    fn activate(&mut self, mode: Mode) -> Result<()> {
        self.mode.set(mode);
        let scheme = color_scheme(Some(mode));
        self.connection
            .emit_signal(
                None::<BusName<'_>>,
                PORTAL_OBJECT_PATH,
                PORTAL_SETTINGS_IFACE,
                "SettingChanged",
                &(APPEARANCE_NAMESPACE, COLOR_SCHEME_KEY, Value::from(scheme)),
            )
            .context("failed to emit SettingChanged")?;
        log_debug!(self.log, "Portal color-scheme is now {scheme}");
        Ok(())
    }
}
