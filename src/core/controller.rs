//! Light/dark scheduling state machine.
//!
//! The Controller owns the active mode, the current location and the one armed
//! [`Alarm`]. It is driven from a single thread, the event loop, which calls
//! [`Controller::fire_due`] when the alarm's time has come and forwards location
//! fixes and clock disturbances as they arrive.
//!
//! When the next transition cannot be computed (polar day or night) nothing is armed
//! and the calculation is retried every [`CALCULATION_RETRY_MINUTES`] minutes instead.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;

use crate::activator::ModeActivator;
use crate::common::constants::CALCULATION_RETRY_MINUTES;
use crate::common::logger::Log;
use crate::core::alarm::Alarm;
use crate::core::mode::Mode;
use crate::geo::location::Location;
use crate::geo::transition::next_change;
use crate::state::location::LocationCache;
use crate::time::TimeSource;

pub struct Controller {
    location: Option<Location>,
    mode: Option<Mode>,
    alarm: Option<Alarm>,
    next_alarm_id: u64,
    retry_at: Option<DateTime<Local>>,
    activators: Vec<Box<dyn ModeActivator>>,
    cache: LocationCache,
    clock: Arc<dyn TimeSource>,
    log: Log,
}

impl Controller {
    /// A Controller with no location, no mode and nothing scheduled.
    ///
    /// `activator` is notified first on every mode change; see [`Self::add_activator`].
    pub fn new(
        activator: Box<dyn ModeActivator>,
        cache: LocationCache,
        clock: Arc<dyn TimeSource>,
        log: Log,
    ) -> Self {
        Self {
            location: None,
            mode: None,
            alarm: None,
            next_alarm_id: 0,
            retry_at: None,
            activators: vec![activator],
            cache,
            clock,
            log,
        }
    }

    /// Notify `activator` too, after the ones already registered.
    pub fn add_activator(&mut self, activator: Box<dyn ModeActivator>) {
        self.activators.push(activator);
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn alarm(&self) -> Option<&Alarm> {
        self.alarm.as_ref()
    }

    /// Replace the current location and reschedule.
    ///
    /// Returns `false` without doing anything when `location` equals the current one.
    pub fn set_location(&mut self, location: Location) -> Result<bool> {
        if self.location == Some(location) {
            log_debug!(self.log, "Location unchanged ({location}), keeping schedule");
            return Ok(false);
        }

        log_block_start!(self.log, "Location set to {location}");
        self.location = Some(location);
        self.rebuild()?;
        Ok(true)
    }

    /// Cancel the armed alarm and schedule the next transition from the current clock.
    ///
    /// When the active mode is unknown, or already equals the mode of the transition
    /// being scheduled, the opposite mode is applied first so that the upcoming
    /// transition is always a real switch. On a calculation error no alarm is left armed
    /// and a retry is scheduled.
    pub fn rebuild(&mut self) -> Result<()> {
        self.retry_at = None;

        if let Some(alarm) = self.alarm.take() {
            let id = alarm.id();
            let cancelled = alarm.cancel();
            log_debug!(
                self.log,
                "Cancelled alarm #{id} ({} at {})",
                cancelled.mode,
                cancelled.at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        let Some(location) = self.location else {
            log_debug!(self.log, "No location yet, nothing to schedule");
            return Ok(());
        };

        let now = self.clock.now();
        let transition = next_change(&location, &now)
            .inspect_err(|_| {
                self.retry_at = Some(now + chrono::Duration::minutes(CALCULATION_RETRY_MINUTES));
            })
            .with_context(|| format!("failed to compute the next transition for {location}"))?;

        if self.mode.is_none_or(|mode| mode == transition.mode) {
            self.apply_mode(transition.mode.opposite());
        }

        self.next_alarm_id += 1;
        let alarm = Alarm::arm(self.next_alarm_id, transition);

        log_decorated!(
            self.log,
            "Next transition: {} mode at {}",
            alarm.mode(),
            alarm.at().format("%Y-%m-%d %H:%M:%S")
        );
        log_indented!(self.log, "in {}", format_remaining(alarm.remaining(now)));

        self.alarm = Some(alarm);
        Ok(())
    }

    /// Make `mode` the active mode and hand it to every activator, in registration order.
    ///
    /// Activator failures are logged; the in-memory mode is updated regardless and the
    /// remaining activators still run.
    pub fn apply_mode(&mut self, mode: Mode) {
        match self.mode.replace(mode) {
            Some(previous) if previous != mode => {
                log_decorated!(self.log, "Switching from {previous} to {mode} mode")
            }
            Some(_) => log_decorated!(self.log, "Re-applying {mode} mode"),
            None => log_decorated!(self.log, "Activating {mode} mode"),
        }

        for activator in &mut self.activators {
            if let Err(e) = activator.activate(mode) {
                log_error!(
                    self.log,
                    "{} activator failed for {mode} mode: {e:#}",
                    activator.name()
                );
            }
        }
    }

    /// Entry point for a fresh geolocation fix: persist it, then adopt it.
    pub fn on_location_fix(&mut self, location: Location) -> Result<()> {
        if let Err(e) = self.cache.save(&location) {
            log_warning!(self.log, "Failed to cache location: {e:#}");
        }
        self.set_location(location)?;
        Ok(())
    }

    /// Fire the armed alarm if it is due, then schedule the following one.
    ///
    /// Returns whether a transition took place.
    pub fn fire_due(&mut self) -> Result<bool> {
        let now = self.clock.now();
        let Some(alarm) = self.alarm.take_if(|alarm| alarm.is_due(now)) else {
            return Ok(false);
        };

        log_block_start!(self.log, "Transition #{} due", alarm.id());
        let mode = alarm.fire();
        self.apply_mode(mode);
        self.rebuild()?;
        Ok(true)
    }

    /// Retry a failed calculation once its retry time has come.
    ///
    /// Returns whether a retry was attempted.
    pub fn retry_due(&mut self) -> Result<bool> {
        let now = self.clock.now();
        if self.retry_at.is_none_or(|at| at > now) {
            return Ok(false);
        }

        log_block_start!(self.log, "Retrying the transition calculation");
        self.rebuild()?;
        Ok(true)
    }

    /// How long until the armed alarm is due, `None` when nothing is armed.
    pub fn time_until_alarm(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.alarm.as_ref().map(|alarm| alarm.remaining(now))
    }

    /// How long until a failed calculation is retried, `None` when no retry is pending.
    pub fn time_until_retry(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.retry_at.map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }
}

fn format_remaining(remaining: Duration) -> String {
    let total_minutes = remaining.as_secs() / 60;
    let (hours, minutes) = (total_minutes / 60, total_minutes % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::MockModeActivator;
    use crate::common::constants::test_constants::*;
    use crate::geo::solar::{SolarError, day_bounds};
    use crate::time::ManualTimeSource;
    use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use tempfile::{TempDir, tempdir};

    fn berlin() -> Location {
        Location::new(TEST_BERLIN_LATITUDE, TEST_BERLIN_LONGITUDE).unwrap()
    }

    fn midsummer_bounds() -> (DateTime<Local>, DateTime<Local>) {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let bounds = day_bounds(&berlin(), date, &Utc).unwrap();
        (
            bounds.dawn.with_timezone(&Local),
            bounds.dusk.with_timezone(&Local),
        )
    }

    fn quiet_activator() -> MockModeActivator {
        let mut activator = MockModeActivator::new();
        activator.expect_name().return_const("mock");
        activator.expect_activate().returning(|_| Ok(()));
        activator
    }

    fn controller(
        activator: MockModeActivator,
        now: DateTime<Local>,
    ) -> (Controller, Arc<ManualTimeSource>, Log, TempDir) {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualTimeSource::new(now));
        let log = Log::capture();
        let controller = Controller::new(
            Box::new(activator),
            LocationCache::new(dir.path().join("location.json")),
            clock.clone(),
            log.clone(),
        );
        (controller, clock, log, dir)
    }

    #[test]
    fn test_idle_without_location() {
        let mut activator = MockModeActivator::new();
        activator.expect_activate().never();
        let (mut controller, _, _, _dir) = controller(activator, Local::now());

        controller.rebuild().unwrap();
        assert!(controller.alarm().is_none());
        assert!(controller.mode().is_none());
        assert_eq!(controller.time_until_alarm(), None);
        assert!(!controller.fire_due().unwrap());
    }

    #[test]
    fn test_first_location_applies_provisional_mode() {
        let (dawn, _) = midsummer_bounds();
        let mut activator = MockModeActivator::new();
        activator
            .expect_activate()
            .with(eq(Mode::Dark))
            .times(1)
            .returning(|_| Ok(()));
        let (mut controller, _, _, _dir) = controller(activator, dawn - ChronoDuration::hours(1));

        assert!(controller.set_location(berlin()).unwrap());

        assert_eq!(controller.mode(), Some(Mode::Dark));
        let alarm = controller.alarm().unwrap();
        assert_eq!(alarm.mode(), Mode::Light);
        assert_eq!(alarm.at(), dawn);
        assert_eq!(
            controller.time_until_alarm(),
            Some(std::time::Duration::from_secs(3600))
        );
    }

    #[test]
    fn test_equal_location_does_not_rebuild() {
        let (dawn, _) = midsummer_bounds();
        let mut activator = MockModeActivator::new();
        activator.expect_activate().times(1).returning(|_| Ok(()));
        let (mut controller, _, _, _dir) = controller(activator, dawn - ChronoDuration::hours(1));

        assert!(controller.set_location(berlin()).unwrap());
        let first_id = controller.alarm().unwrap().id();

        assert!(!controller.set_location(berlin()).unwrap());
        assert_eq!(controller.alarm().unwrap().id(), first_id);
    }

    #[test]
    fn test_rebuild_replaces_the_alarm() {
        let (dawn, _) = midsummer_bounds();
        let (mut controller, _, _, _dir) =
            controller(quiet_activator(), dawn - ChronoDuration::hours(1));

        controller.set_location(berlin()).unwrap();
        let first = controller.alarm().unwrap().id();
        controller.rebuild().unwrap();
        let second = controller.alarm().unwrap().id();

        assert!(second > first);
        assert_eq!(controller.alarm().unwrap().at(), dawn);
    }

    #[test]
    fn test_fire_due_switches_and_reschedules() {
        let (dawn, dusk) = midsummer_bounds();
        let mut sequence = Sequence::new();
        let mut activator = MockModeActivator::new();
        activator
            .expect_activate()
            .with(eq(Mode::Dark))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        activator
            .expect_activate()
            .with(eq(Mode::Light))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let (mut controller, clock, _, _dir) =
            controller(activator, dawn - ChronoDuration::hours(1));

        controller.set_location(berlin()).unwrap();

        clock.set(dawn - ChronoDuration::seconds(1));
        assert!(!controller.fire_due().unwrap());

        clock.set(dawn);
        assert!(controller.fire_due().unwrap());
        assert_eq!(controller.mode(), Some(Mode::Light));
        let alarm = controller.alarm().unwrap();
        assert_eq!(alarm.mode(), Mode::Dark);
        assert_eq!(alarm.at(), dusk);
    }

    #[test]
    fn test_stale_alarm_is_reconciled_after_a_long_gap() {
        let (dawn, dusk) = midsummer_bounds();
        let (mut controller, clock, _, _dir) =
            controller(quiet_activator(), dawn - ChronoDuration::hours(1));
        controller.set_location(berlin()).unwrap();

        // Asleep through dawn and dusk; wakes up the next day around noon
        clock.set(dusk + ChronoDuration::hours(14));
        assert!(controller.fire_due().unwrap());

        let alarm = controller.alarm().unwrap();
        assert_eq!(alarm.mode(), Mode::Dark);
        assert_eq!(controller.mode(), Some(Mode::Light));
    }

    #[test]
    fn test_activator_failure_is_logged_not_fatal() {
        let (dawn, _) = midsummer_bounds();
        let mut activator = MockModeActivator::new();
        activator.expect_name().return_const("mock");
        activator
            .expect_activate()
            .returning(|_| Err(anyhow::anyhow!("display server went away")));
        let (mut controller, _, log, _dir) =
            controller(activator, dawn - ChronoDuration::hours(1));

        controller.set_location(berlin()).unwrap();

        assert_eq!(controller.mode(), Some(Mode::Dark));
        assert!(controller.alarm().is_some());
        assert!(
            log.captured()
                .iter()
                .any(|l| l.contains("mock activator failed") && l.contains("display server"))
        );
    }

    #[test]
    fn test_calculation_error_leaves_no_alarm() {
        let tromso_noon = Utc
            .with_ymd_and_hms(2024, 6, 21, 12, 0, 0)
            .unwrap()
            .with_timezone(&Local);
        let (dawn, _) = midsummer_bounds();
        let (mut controller, clock, _, _dir) =
            controller(quiet_activator(), dawn - ChronoDuration::hours(1));
        controller.set_location(berlin()).unwrap();
        assert!(controller.alarm().is_some());

        clock.set(tromso_noon);
        let tromso = Location::new(TEST_TROMSO_LATITUDE, TEST_TROMSO_LONGITUDE).unwrap();
        let err = controller.set_location(tromso).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SolarError>(),
            Some(SolarError::NoTwilight { .. })
        ));
        assert!(controller.alarm().is_none());
        assert_eq!(controller.location(), Some(tromso));
    }

    #[test]
    fn test_relocation_towards_the_active_mode_switches_first() {
        let (dawn, _) = midsummer_bounds();
        let mut sequence = Sequence::new();
        let mut activator = MockModeActivator::new();
        activator
            .expect_activate()
            .with(eq(Mode::Light))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        activator
            .expect_activate()
            .with(eq(Mode::Dark))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let (mut controller, _, _, _dir) = controller(activator, dawn + ChronoDuration::hours(1));

        // Morning in Berlin: dusk is next, so Light is applied
        controller.set_location(berlin()).unwrap();
        assert_eq!(controller.mode(), Some(Mode::Light));
        assert_eq!(controller.alarm().unwrap().mode(), Mode::Dark);

        // Still night in New York: the next transition is to Light, which is already active
        let new_york = Location::new(40.7128, -74.0060).unwrap();
        controller.set_location(new_york).unwrap();
        assert_eq!(controller.mode(), Some(Mode::Dark));
        assert_eq!(controller.alarm().unwrap().mode(), Mode::Light);
    }

    #[test]
    fn test_every_activator_is_notified_in_order() {
        let (dawn, _) = midsummer_bounds();
        let mut sequence = Sequence::new();
        let mut failing = MockModeActivator::new();
        failing.expect_name().return_const("first");
        failing
            .expect_activate()
            .with(eq(Mode::Dark))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(anyhow::anyhow!("bus unavailable")));
        let mut second = MockModeActivator::new();
        second
            .expect_activate()
            .with(eq(Mode::Dark))
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(()));
        let (mut controller, _, log, _dir) = controller(failing, dawn - ChronoDuration::hours(1));
        controller.add_activator(Box::new(second));

        controller.set_location(berlin()).unwrap();

        assert_eq!(controller.mode(), Some(Mode::Dark));
        assert!(
            log.captured()
                .iter()
                .any(|l| l.contains("first activator failed") && l.contains("bus unavailable"))
        );
    }

    #[test]
    fn test_failed_calculation_is_retried() {
        let tromso_noon = Utc
            .with_ymd_and_hms(2024, 6, 21, 12, 0, 0)
            .unwrap()
            .with_timezone(&Local);
        let (mut controller, clock, _, _dir) = controller(quiet_activator(), tromso_noon);
        let tromso = Location::new(TEST_TROMSO_LATITUDE, TEST_TROMSO_LONGITUDE).unwrap();

        assert!(controller.set_location(tromso).is_err());
        assert!(controller.alarm().is_none());
        assert_eq!(
            controller.time_until_retry(),
            Some(std::time::Duration::from_secs(
                CALCULATION_RETRY_MINUTES as u64 * 60
            ))
        );

        clock.set(tromso_noon + ChronoDuration::minutes(30));
        assert!(!controller.retry_due().unwrap());

        // Still midnight sun an hour later: the retry fails and is rescheduled
        clock.set(tromso_noon + ChronoDuration::minutes(CALCULATION_RETRY_MINUTES));
        assert!(controller.retry_due().is_err());
        assert!(controller.time_until_retry().is_some());

        // Autumn brings twilight back
        clock.set(
            Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0)
                .unwrap()
                .with_timezone(&Local),
        );
        assert!(controller.retry_due().unwrap());
        assert!(controller.alarm().is_some());
        assert!(controller.mode().is_some());
        assert_eq!(controller.time_until_retry(), None);
        assert!(!controller.retry_due().unwrap());
    }

    #[test]
    fn test_no_retry_without_a_failure() {
        let (dawn, _) = midsummer_bounds();
        let (mut controller, _, _, _dir) =
            controller(quiet_activator(), dawn - ChronoDuration::hours(1));

        controller.set_location(berlin()).unwrap();
        assert_eq!(controller.time_until_retry(), None);
        assert!(!controller.retry_due().unwrap());
    }

    #[test]
    fn test_location_fix_is_cached_and_adopted() {
        let (dawn, _) = midsummer_bounds();
        let (mut controller, _, _, dir) =
            controller(quiet_activator(), dawn - ChronoDuration::hours(1));

        controller.on_location_fix(berlin()).unwrap();

        let cached = LocationCache::new(dir.path().join("location.json"))
            .load()
            .unwrap();
        assert_eq!(cached, Some(berlin()));
        assert_eq!(controller.location(), Some(berlin()));
        assert!(controller.alarm().is_some());
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(std::time::Duration::from_secs(59)), "0m");
        assert_eq!(format_remaining(std::time::Duration::from_secs(3 * 3600 + 125)), "3h 2m");
    }
}
