//! Application coordinator that manages the complete lifecycle of dusklight.
//!
//! Startup order matters: configuration first (it decides debug output), then the
//! single-instance lock, signal handling and system monitors, and only then the
//! Controller, which may already switch the mode while being seeded with a location.
//! The session bus activators are registered before that first switch so they
//! publish it too.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::{
    activator::{ModeActivator, ModeService, PortalSettings, ScriptActivator},
    common::logger::Log,
    config::Config,
    core::{Controller, Core},
    geo::location::Location,
    io::{dbus, geoclue, lock, signals::setup_signal_handler},
    state::location::LocationCache,
    time::RealTimeSource,
};

/// Runs the dusklight daemon: `Dusklight::new().run()`.
#[derive(Debug, Default)]
pub struct Dusklight;

impl Dusklight {
    pub fn new() -> Self {
        Self
    }

    /// Run the daemon until SIGINT, SIGTERM or SIGHUP.
    pub fn run(self) -> Result<()> {
        let config = Config::load().context("Failed to load configuration")?;

        let log = Log::stdout(config.debug());
        log_version!(log);
        config.log_config(&log);

        let instance_lock = lock::acquire_lock(&lock::default_lock_path(), &log)?;
        log_debug!(log, "Holding lock {}", instance_lock.path().display());

        let signal_state = setup_signal_handler(log.clone())?;
        dbus::start_system_monitors(signal_state.signal_sender.clone(), log.clone());

        let cache = LocationCache::at_default_path()?;
        let initial_location = initial_location(&cache, &config, &log);

        let activator = ScriptActivator::new(log.clone())?;
        let mut controller = Controller::new(
            Box::new(activator),
            cache,
            Arc::new(RealTimeSource),
            log.clone(),
        );
        for activator in bus_activators(&config, &log) {
            controller.add_activator(activator);
        }

        if let Some(location) = initial_location
            && let Err(e) = controller.set_location(location)
        {
            log_pipe!(log);
            log_error!(log, "Failed to schedule the next transition: {e:#}");
        }

        if config.use_geoclue() {
            log_block_start!(log, "Asking GeoClue for the current location");
            if let Err(e) = geoclue::spawn_location_listener(
                config.desktop_id().to_string(),
                log.clone(),
                signal_state.signal_sender.clone(),
            ) {
                log_warning!(log, "{e:#}");
            }
        } else if initial_location.is_none() {
            log_pipe!(log);
            log_warning!(log, "No location available and GeoClue is disabled");
            log_indented!(log, "Set latitude and longitude in the configuration file");
        }

        Core::new(controller, signal_state, log.clone()).execute()?;

        log_end!(log);
        Ok(())
    }
}

/// Start the session bus activators enabled in `config`.
///
/// A service that cannot be started is reported and left out; scheduling and scripts
/// work without it.
pub fn bus_activators(config: &Config, log: &Log) -> Vec<Box<dyn ModeActivator>> {
    let mut activators: Vec<Box<dyn ModeActivator>> = Vec::new();
    if !config.dbus_server() && !config.portal() {
        return activators;
    }

    log_block_start!(log, "Registering on the session bus");
    if config.dbus_server() {
        match ModeService::start(log.clone()) {
            Ok(service) => activators.push(Box::new(service)),
            Err(e) => log_warning!(log, "Mode service unavailable: {e:#}"),
        }
    }
    if config.portal() {
        match PortalSettings::start(log.clone()) {
            Ok(portal) => activators.push(Box::new(portal)),
            Err(e) => log_warning!(log, "Settings portal unavailable: {e:#}"),
        }
    }
    activators
}

/// Pick the location the Controller starts with: the cached fix, else the configured one.
pub fn initial_location(cache: &LocationCache, config: &Config, log: &Log) -> Option<Location> {
    match cache.load() {
        Ok(Some(location)) => {
            log_decorated!(log, "Using cached location {location}");
            return Some(location);
        }
        Ok(None) => log_debug!(log, "No cached location"),
        Err(e) => log_warning!(log, "Ignoring location cache: {e:#}"),
    }

    let location = config.static_location();
    if let Some(location) = location {
        log_decorated!(log, "Using configured location {location}");
    }
    location
}
