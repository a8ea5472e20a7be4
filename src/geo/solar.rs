//! Civil dawn and dusk for a single calendar day.
//!
//! Times come from the `sunrise` crate. Before asking it, the sun's approximate
//! declination for the day is used to rule out days on which the sun never crosses
//! the civil twilight altitude (midnight sun or deep polar night). The crate has no
//! answer for those days, so they are reported as [`SolarError::NoTwilight`] instead.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use sunrise::{Coordinates, DawnType, SolarDay, SolarEvent};
use thiserror::Error;

use crate::common::constants::{
    CIVIL_TWILIGHT_ALTITUDE, MAX_EVENT_DRIFT_HOURS, TWILIGHT_GUARD_MARGIN,
};
use crate::geo::location::Location;

/// Reasons the transition search can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolarError {
    #[error("coordinates {latitude}, {longitude} are outside the valid range")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("the sun does not cross civil twilight on {date} at latitude {latitude:.4}")]
    NoTwilight { date: NaiveDate, latitude: f64 },

    #[error("solar library returned {event} at {instant} for {date}, which is not on that day")]
    InvalidEvent {
        date: NaiveDate,
        event: &'static str,
        instant: DateTime<Utc>,
    },

    #[error("dawn ({dawn}) is not before dusk ({dusk}) on {date}")]
    Misordered {
        date: NaiveDate,
        dawn: DateTime<Utc>,
        dusk: DateTime<Utc>,
    },

    #[error("no transition found within {days} days after {reference}")]
    LookaheadExhausted {
        reference: DateTime<Utc>,
        days: u32,
    },
}

/// Civil dawn and civil dusk of one day, in the caller's time zone.
#[derive(Debug, Clone)]
pub struct DayBounds<Tz: TimeZone> {
    pub dawn: DateTime<Tz>,
    pub dusk: DateTime<Tz>,
}

/// Compute civil dawn and dusk for `date` at `location`.
///
/// The returned bounds are not checked for ordering; that is the caller's job.
pub fn day_bounds<Tz: TimeZone>(
    location: &Location,
    date: NaiveDate,
    tz: &Tz,
) -> Result<DayBounds<Tz>, SolarError> {
    let coord = Coordinates::new(location.lat, location.lng).ok_or(
        SolarError::InvalidCoordinates {
            latitude: location.lat,
            longitude: location.lng,
        },
    )?;

    if !crosses_civil_twilight(location.lat, date) {
        return Err(SolarError::NoTwilight {
            date,
            latitude: location.lat,
        });
    }

    let solar_day = SolarDay::new(coord, date);
    let dawn = solar_day.event_time(SolarEvent::Dawn(DawnType::Civil));
    let dusk = solar_day.event_time(SolarEvent::Dusk(DawnType::Civil));

    let noon = approximate_solar_noon(location.lng, date);
    for (event, instant) in [("civil dawn", dawn), ("civil dusk", dusk)] {
        if (instant - noon).num_hours().abs() > MAX_EVENT_DRIFT_HOURS {
            return Err(SolarError::InvalidEvent {
                date,
                event,
                instant,
            });
        }
    }

    Ok(DayBounds {
        dawn: dawn.with_timezone(tz),
        dusk: dusk.with_timezone(tz),
    })
}

/// Whether the sun passes through the civil twilight altitude at some point on `date`.
///
/// Uses the cosine approximation of solar declination, which is good to about a
/// degree. Only days that clearly miss the band are rejected.
pub fn crosses_civil_twilight(latitude: f64, date: NaiveDate) -> bool {
    let declination = approximate_declination(date);
    let highest = 90.0 - (latitude - declination).abs();
    let lowest = -90.0 + (latitude + declination).abs();

    let never_dark_enough = lowest > CIVIL_TWILIGHT_ALTITUDE + TWILIGHT_GUARD_MARGIN;
    let never_bright_enough = highest < CIVIL_TWILIGHT_ALTITUDE - TWILIGHT_GUARD_MARGIN;
    !(never_dark_enough || never_bright_enough)
}

fn approximate_declination(date: NaiveDate) -> f64 {
    let day_of_year = f64::from(date.ordinal());
    -23.44 * (360.0 / 365.0 * (day_of_year + 10.0)).to_radians().cos()
}

fn approximate_solar_noon(longitude: f64, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN).and_utc();
    let offset_minutes = (longitude / 15.0 * 60.0).round() as i64;
    midnight + Duration::hours(12) - Duration::minutes(offset_minutes)
}
