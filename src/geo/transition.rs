//! Next light/dark transition for a location and a reference instant.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};

use crate::common::constants::MAX_DAY_LOOKAHEAD;
use crate::core::mode::Mode;
use crate::geo::location::Location;
use crate::geo::solar::{DayBounds, SolarError, day_bounds};

/// A switch into `mode` at instant `at`.
#[derive(Debug, Clone)]
pub struct Transition<Tz: TimeZone> {
    pub at: DateTime<Tz>,
    pub mode: Mode,
}

/// Find the first transition strictly after `reference`.
///
/// Dawn and dusk are taken for the calendar date of `reference` in its own time zone.
/// Before dawn the next transition is dawn into Light, between dawn and dusk it is dusk
/// into Dark, and at or after dusk the following day is examined. The search gives up
/// after [`MAX_DAY_LOOKAHEAD`] days.
pub fn next_change<Tz: TimeZone>(
    location: &Location,
    reference: &DateTime<Tz>,
) -> Result<Transition<Tz>, SolarError> {
    let tz = reference.timezone();
    next_change_with(reference, |date| day_bounds(location, date, &tz))
}

/// [`next_change`] with the day boundary source supplied by the caller.
pub(crate) fn next_change_with<Tz, F>(
    reference: &DateTime<Tz>,
    mut bounds_for: F,
) -> Result<Transition<Tz>, SolarError>
where
    Tz: TimeZone,
    F: FnMut(NaiveDate) -> Result<DayBounds<Tz>, SolarError>,
{
    let start = reference.date_naive();

    for offset in 0..MAX_DAY_LOOKAHEAD {
        let Some(date) = start.checked_add_days(Days::new(u64::from(offset))) else {
            break;
        };
        let DayBounds { dawn, dusk } = bounds_for(date)?;

        if dawn >= dusk {
            return Err(SolarError::Misordered {
                date,
                dawn: dawn.with_timezone(&Utc),
                dusk: dusk.with_timezone(&Utc),
            });
        }

        if *reference >= dusk {
            continue;
        }
        if *reference >= dawn {
            return Ok(Transition {
                at: dusk,
                mode: Mode::Dark,
            });
        }
        return Ok(Transition {
            at: dawn,
            mode: Mode::Light,
        });
    }

    Err(SolarError::LookaheadExhausted {
        reference: reference.with_timezone(&Utc),
        days: MAX_DAY_LOOKAHEAD,
    })
}
