//! One-shot location lookup through GeoClue2.
//!
//! The handshake runs on the system bus and follows a fixed order:
//!
//! 1. `Manager.GetClient` creates a client object private to our connection
//! 2. the client's `DesktopId` property is set, GeoClue refuses to start without it
//! 3. a match rule for the client's `LocationUpdated` signal is registered
//! 4. `Start` is called and exactly one `LocationUpdated` is awaited
//! 5. the subscription is dropped, `Stop` is called and the new location object is
//!    read with a single `Properties.GetAll`
//!
//! GeoClue may emit the first `LocationUpdated` while `Start` is still in flight. The
//! subscription therefore exists before `Start` is issued, so that signal is queued
//! rather than lost.
//!
//! The bus is reached through the [`GeoClueBus`] trait. [`ZbusGeoClue`] is the real
//! implementation; tests drive [`GeoClueClient`] with fakes.

use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use zbus::blocking::Connection;
use zbus::proxy::CacheProperties;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use crate::common::constants::{
    DBUS_PROPERTIES_IFACE, GEOCLUE_LOCATION_IFACE, GEOCLUE_MANAGER_PATH, GEOCLUE_SERVICE,
};
use crate::common::logger::Log;
use crate::geo::location::Location;
use crate::io::signals::SignalMessage;

mod proxy {
    use zbus::zvariant::{ObjectPath, OwnedObjectPath};

    /// GeoClue2 Manager, the entry point handing out client objects.
    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Manager",
        default_service = "org.freedesktop.GeoClue2"
    )]
    pub trait Manager {
        /// Return the client object for this connection, creating it if needed.
        fn get_client(&self) -> zbus::Result<OwnedObjectPath>;
    }

    /// A per-connection GeoClue2 client object.
    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Client",
        default_service = "org.freedesktop.GeoClue2"
    )]
    pub trait Client {
        fn start(&self) -> zbus::Result<()>;

        fn stop(&self) -> zbus::Result<()>;

        #[zbus(property)]
        fn desktop_id(&self) -> zbus::Result<String>;

        #[zbus(property)]
        fn set_desktop_id(&self, desktop_id: &str) -> zbus::Result<()>;

        /// Emitted whenever the client's location object changes.
        #[zbus(signal)]
        fn location_updated(
            &self,
            old_location: ObjectPath<'_>,
            new_location: ObjectPath<'_>,
        ) -> zbus::Result<()>;
    }
}

use proxy::{ClientProxyBlocking, ManagerProxyBlocking};

/// Arguments of a `LocationUpdated` signal.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    pub old_path: OwnedObjectPath,
    pub new_path: OwnedObjectPath,
}

/// A decoded GeoClue location object.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    pub location: Location,
    /// Radius of the accuracy circle, in meters
    pub accuracy: Option<f64>,
    pub altitude: Option<f64>,
    pub description: Option<String>,
}

/// Signals received on a live subscription. Dropping it removes the match rule.
pub type LocationUpdates<'a> = Box<dyn Iterator<Item = Result<LocationUpdate>> + 'a>;

/// The bus operations the handshake needs.
pub trait GeoClueBus {
    fn get_client(&self) -> Result<OwnedObjectPath>;

    fn set_desktop_id(&self, client: &OwnedObjectPath, desktop_id: &str) -> Result<()>;

    /// Register for `LocationUpdated` on `client`. Must not return before the match
    /// rule is active on the bus.
    fn subscribe(&self, client: &OwnedObjectPath) -> Result<LocationUpdates<'_>>;

    fn start(&self, client: &OwnedObjectPath) -> Result<()>;

    fn stop(&self, client: &OwnedObjectPath) -> Result<()>;

    /// Fetch and decode every property of a location object.
    fn read_location(&self, location: &OwnedObjectPath) -> Result<LocationFix>;
}

/// [`GeoClueBus`] over a zbus system bus connection.
pub struct ZbusGeoClue {
    connection: Connection,
}

impl ZbusGeoClue {
    pub fn connect() -> Result<Self> {
        let connection = Connection::system().context("failed to connect to the system bus")?;
        Ok(Self { connection })
    }

    fn client(&self, path: &OwnedObjectPath) -> Result<ClientProxyBlocking<'static>> {
        ClientProxyBlocking::builder(&self.connection)
            .path(path.clone())?
            .cache_properties(CacheProperties::No)
            .build()
            .with_context(|| format!("failed to create proxy for GeoClue client {path}"))
    }
}

impl GeoClueBus for ZbusGeoClue {
    fn get_client(&self) -> Result<OwnedObjectPath> {
        let manager = ManagerProxyBlocking::builder(&self.connection)
            .path(GEOCLUE_MANAGER_PATH)?
            .build()
            .context("failed to create GeoClue manager proxy")?;
        Ok(manager.get_client()?)
    }

    fn set_desktop_id(&self, client: &OwnedObjectPath, desktop_id: &str) -> Result<()> {
        Ok(self.client(client)?.set_desktop_id(desktop_id)?)
    }

    fn subscribe(&self, client: &OwnedObjectPath) -> Result<LocationUpdates<'_>> {
        let proxy = self.client(client)?;
        let signals = proxy.receive_location_updated()?;

        Ok(Box::new(signals.map(|signal| {
            let args = signal
                .args()
                .context("malformed LocationUpdated signal arguments")?;
            Ok(LocationUpdate {
                old_path: OwnedObjectPath::from(args.old_location),
                new_path: OwnedObjectPath::from(args.new_location),
            })
        })))
    }

    fn start(&self, client: &OwnedObjectPath) -> Result<()> {
        Ok(self.client(client)?.start()?)
    }

    fn stop(&self, client: &OwnedObjectPath) -> Result<()> {
        Ok(self.client(client)?.stop()?)
    }

    fn read_location(&self, location: &OwnedObjectPath) -> Result<LocationFix> {
        let properties = zbus::blocking::Proxy::new(
            &self.connection,
            GEOCLUE_SERVICE,
            location.as_str(),
            DBUS_PROPERTIES_IFACE,
        )
        .context("failed to create properties proxy")?;

        let values: HashMap<String, OwnedValue> = properties
            .call("GetAll", &(GEOCLUE_LOCATION_IFACE,))
            .with_context(|| format!("GetAll on {location} failed"))?;

        decode_location(values)
    }
}

/// Turn the `GetAll` reply of a location object into a [`LocationFix`].
///
/// `Latitude` and `Longitude` are required. `Accuracy`, `Altitude` and `Description`
/// are kept when present and meaningful; GeoClue reports an unknown altitude as
/// `-f64::MAX`.
pub fn decode_location(mut values: HashMap<String, OwnedValue>) -> Result<LocationFix> {
    let mut required = |name: &str| -> Result<f64> {
        let value = values
            .remove(name)
            .ok_or_else(|| anyhow!("location object has no {name} property"))?;
        f64::try_from(value).with_context(|| format!("{name} is not a double"))
    };

    let lat = required("Latitude")?;
    let lng = required("Longitude")?;
    let location = Location::new(lat, lng).context("GeoClue reported an invalid location")?;

    let accuracy = values
        .remove("Accuracy")
        .and_then(|v| f64::try_from(v).ok())
        .filter(|a| a.is_finite() && *a >= 0.0);
    let altitude = values
        .remove("Altitude")
        .and_then(|v| f64::try_from(v).ok())
        .filter(|a| a.is_finite() && *a > -f64::MAX);
    let description = values
        .remove("Description")
        .and_then(|v| String::try_from(v).ok())
        .filter(|d| !d.is_empty());

    Ok(LocationFix {
        location,
        accuracy,
        altitude,
        description,
    })
}

/// Drives the five-step handshake over a [`GeoClueBus`].
pub struct GeoClueClient<B: GeoClueBus> {
    bus: B,
    desktop_id: String,
    log: Log,
}

impl<B: GeoClueBus> GeoClueClient<B> {
    pub fn new(bus: B, desktop_id: impl Into<String>, log: Log) -> Self {
        Self {
            bus,
            desktop_id: desktop_id.into(),
            log,
        }
    }

    /// Obtain one location and pass it to `on_fix`.
    ///
    /// Any bus failure aborts the flow and is returned; nothing is retried. `on_fix` is
    /// called at most once, and only after GeoClue has been told to stop.
    pub fn run(&self, on_fix: impl FnOnce(LocationFix)) -> Result<()> {
        let client = self
            .bus
            .get_client()
            .context("GeoClue GetClient failed")?;
        log_debug!(self.log, "GeoClue client object: {client}");

        self.bus
            .set_desktop_id(&client, &self.desktop_id)
            .with_context(|| format!("failed to set DesktopId to {:?}", self.desktop_id))?;

        let mut updates = self
            .bus
            .subscribe(&client)
            .context("failed to subscribe to LocationUpdated")?;

        self.bus.start(&client).context("GeoClue Start failed")?;
        log_debug!(self.log, "GeoClue started, waiting for a location");

        let update = updates
            .next()
            .context("LocationUpdated signal stream ended before a location arrived")??;
        drop(updates);
        log_debug!(
            self.log,
            "LocationUpdated: {} -> {}",
            update.old_path,
            update.new_path
        );

        self.bus.stop(&client).context("GeoClue Stop failed")?;

        let fix = self
            .bus
            .read_location(&update.new_path)
            .with_context(|| format!("failed to read location object {}", update.new_path))?;

        log_block_start!(self.log, "GeoClue location: {}", fix.location);
        if let Some(accuracy) = fix.accuracy {
            log_indented!(self.log, "Accuracy: {accuracy:.0} m");
        }
        if let Some(altitude) = fix.altitude {
            log_indented!(self.log, "Altitude: {altitude:.0} m");
        }
        if let Some(description) = &fix.description {
            log_indented!(self.log, "Source: {description}");
        }

        on_fix(fix);
        Ok(())
    }
}

/// Run the GeoClue handshake on its own thread and post the fix to the event loop.
///
/// Failures are logged; the daemon keeps running on whatever location it already has.
pub fn spawn_location_listener(
    desktop_id: String,
    log: Log,
    signal_sender: Sender<SignalMessage>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("geoclue".to_string())
        .spawn(move || {
            let result = ZbusGeoClue::connect().and_then(|bus| {
                GeoClueClient::new(bus, desktop_id, log.clone()).run(|fix| {
                    if signal_sender.send(SignalMessage::LocationFix(fix)).is_err() {
                        log_debug!(log, "Event loop gone, dropping GeoClue location");
                    }
                })
            });

            if let Err(e) = result {
                log_pipe!(log);
                log_error!(log, "Location lookup via GeoClue failed: {e:#}");
                log_indented!(log, "Continuing with the cached or configured location");
            }
        })
        .context("failed to spawn GeoClue thread")
}
