//! The Controller's single pending transition.

use chrono::{DateTime, Local};
use std::time::Duration;

use crate::core::mode::Mode;
use crate::geo::transition::Transition;

/// An armed transition.
///
/// Not `Clone`: the Controller holds the only handle, and cancelling or firing consumes
/// it, so an alarm that was replaced can never fire afterwards.
#[derive(Debug)]
pub struct Alarm {
    id: u64,
    at: DateTime<Local>,
    mode: Mode,
}

impl Alarm {
    pub(crate) fn arm(id: u64, transition: Transition<Local>) -> Self {
        Self {
            id,
            at: transition.at,
            mode: transition.mode,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn at(&self) -> DateTime<Local> {
        self.at
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        now >= self.at
    }

    /// Time left until the alarm is due, zero once it is.
    pub fn remaining(&self, now: DateTime<Local>) -> Duration {
        (self.at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Disarm without firing.
    pub(crate) fn cancel(self) -> Transition<Local> {
        Transition {
            at: self.at,
            mode: self.mode,
        }
    }

    /// Consume the alarm, returning the mode it switches into.
    pub(crate) fn fire(self) -> Mode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn alarm_at(at: DateTime<Local>) -> Alarm {
        Alarm::arm(
            7,
            Transition {
                at,
                mode: Mode::Dark,
            },
        )
    }

    #[test]
    fn test_due_at_and_after_its_instant() {
        let at = Local.with_ymd_and_hms(2024, 6, 21, 22, 0, 0).unwrap();
        let alarm = alarm_at(at);

        assert!(!alarm.is_due(at - ChronoDuration::seconds(1)));
        assert!(alarm.is_due(at));
        assert!(alarm.is_due(at + ChronoDuration::hours(5)));
    }

    #[test]
    fn test_remaining_saturates_at_zero() {
        let at = Local.with_ymd_and_hms(2024, 6, 21, 22, 0, 0).unwrap();
        let alarm = alarm_at(at);

        assert_eq!(
            alarm.remaining(at - ChronoDuration::minutes(2)),
            Duration::from_secs(120)
        );
        assert_eq!(alarm.remaining(at + ChronoDuration::minutes(2)), Duration::ZERO);
    }

    #[test]
    fn test_cancel_returns_what_was_armed() {
        let at = Local.with_ymd_and_hms(2024, 6, 21, 22, 0, 0).unwrap();
        let alarm = alarm_at(at);
        assert_eq!(alarm.id(), 7);

        let transition = alarm.cancel();
        assert_eq!(transition.at, at);
        assert_eq!(transition.mode, Mode::Dark);
    }
}
