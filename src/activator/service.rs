//! Session bus object publishing the current mode.
//!
//! `org.dusklight.Dusklight` at `/org/dusklight/Dusklight` carries a read-only `Mode`
//! property (`"light"`, `"dark"`, or empty before the first transition). Each activation
//! emits `PropertiesChanged` for it and a `ModeChanged(s)` signal, so status bars and
//! editors can follow the mode without polling.

use anyhow::{Context, Result};
use std::collections::HashMap;
use zbus::blocking::Connection;
use zbus::names::BusName;
use zbus::zvariant::Value;

use super::{ModeActivator, SharedMode};
use crate::common::constants::{DBUS_PROPERTIES_IFACE, MODE_SERVICE_NAME, MODE_SERVICE_PATH};
use crate::common::logger::Log;
use crate::core::mode::Mode;

/// Value of the `Mode` property for `mode`.
pub fn mode_name(mode: Option<Mode>) -> &'static str {
    mode.map(Mode::as_str).unwrap_or("")
}

/// The object served on the bus. It only reads the shared mode.
pub struct ModeInterface {
    mode: SharedMode,
}

#[zbus::interface(name = "org.dusklight.Dusklight")]
impl ModeInterface {
    #[zbus(property, name = "Mode")]
    fn current_mode(&self) -> String {
        mode_name(self.mode.get()).to_string()
    }
}

/// Owns `org.dusklight.Dusklight` on the session bus for the daemon's lifetime.
pub struct ModeService {
    connection: Connection,
    mode: SharedMode,
    log: Log,
}

impl ModeService {
    /// Connect to the session bus, export the object and claim the well-known name.
    pub fn start(log: Log) -> Result<Self> {
        let mode = SharedMode::default();
        let interface = ModeInterface { mode: mode.clone() };

        let connection = zbus::blocking::connection::Builder::session()
            .context("failed to connect to the session bus")?
            .serve_at(MODE_SERVICE_PATH, interface)
            .context("failed to export the mode object")?
            .name(MODE_SERVICE_NAME)
            .context("invalid service name")?
            .build()
            .with_context(|| format!("failed to claim {MODE_SERVICE_NAME}"))?;

        log_decorated!(log, "Publishing the mode as {MODE_SERVICE_NAME}");

        Ok(Self {
            connection,
            mode,
            log,
        })
    }

    fn emit_changes(&self, mode: Mode) -> zbus::Result<()> {
        let changed = HashMap::from([("Mode", Value::from(mode.as_str()))]);
        self.connection.emit_signal(
            None::<BusName<'_>>,
            MODE_SERVICE_PATH,
            DBUS_PROPERTIES_IFACE,
            "PropertiesChanged",
            &(MODE_SERVICE_NAME, changed, Vec::<&str>::new()),
        )?;
        self.connection.emit_signal(
            None::<BusName<'_>>,
            MODE_SERVICE_PATH,
            MODE_SERVICE_NAME,
            "ModeChanged",
            &(mode.as_str(),),
        )
    }
}

impl ModeActivator for ModeService {
    fn name(&self) -> &'static str {
        "dbus"
    }

    fn activate(&mut self, mode: Mode) -> Result<()> {
        self.mode.set(mode);
        self.emit_changes(mode)
            .context("failed to signal the mode change")?;
        log_debug!(self.log, "Signalled {mode} mode on {MODE_SERVICE_NAME}");
        Ok(())
    }
}
