//! Wake scheduling on a fixed daily hour grid.
//!
//! The device is told to wake at one of a configured set of hours of the day.
//! A device that polls slightly ahead of a slot (clock drift, early wake) would
//! otherwise be told to wake again within minutes, so a slot that is closer
//! than the drift window is treated as already consumed and the following slot
//! is returned instead.
//!
//! # Example
//!
//! ```
//! use bloomin8_pull::schedule::{default_drift, next_wake};
//! use chrono::NaiveDate;
//!
//! let now = NaiveDate::from_ymd_opt(2026, 5, 4)
//!     .unwrap()
//!     .and_hms_opt(17, 45, 0)
//!     .unwrap();
//!
//! // 18:00 is only 15 minutes away, so tomorrow's 06:00 is used.
//! let wake = next_wake(&[6, 18], now, default_drift()).unwrap();
//! assert_eq!(wake.to_string(), "2026-05-05 06:00:00");
//! ```

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::Error;

/// Default drift window in minutes.
pub const DEFAULT_DRIFT_MINUTES: u32 = 30;

/// Default drift window.
pub fn default_drift() -> Duration {
    Duration::minutes(i64::from(DEFAULT_DRIFT_MINUTES))
}

/// A validated, non-empty, sorted and deduplicated set of wake hours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeHours {
    hours: Vec<u32>,
}

impl WakeHours {
    /// Build a wake grid from raw hours.
    ///
    /// Order is irrelevant and duplicates are collapsed. Fails if the set is
    /// empty or any hour is outside `0..=23`.
    pub fn new(hours: impl IntoIterator<Item = u32>) -> Result<Self, Error> {
        let mut hours: Vec<u32> = hours.into_iter().collect();
        if let Some(bad) = hours.iter().find(|h| **h > 23) {
            return Err(Error::Config(format!(
                "Wake hour {} out of range (expected 0-23)",
                bad
            )));
        }
        hours.sort_unstable();
        hours.dedup();
        if hours.is_empty() {
            return Err(Error::Config("No wake hours configured".to_string()));
        }
        Ok(Self { hours })
    }

    /// Parse a comma-separated hour list such as `"6,18"`.
    ///
    /// Whitespace around entries and empty entries are ignored.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let hours = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| Error::Config(format!("Invalid wake hour '{}'", part)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(hours)
    }

    /// The hours, ascending.
    pub fn hours(&self) -> &[u32] {
        &self.hours
    }

    fn times(&self) -> impl Iterator<Item = NaiveTime> + '_ {
        self.hours
            .iter()
            .filter_map(|h| NaiveTime::from_hms_opt(*h, 0, 0))
    }

    /// Earliest slot strictly after `t`, falling back to the first slot of the
    /// following day.
    pub fn next_slot(&self, t: NaiveDateTime) -> NaiveDateTime {
        let today = t.date();
        let slot = self
            .times()
            .map(|time| today.and_time(time))
            .find(|candidate| *candidate > t);
        if let Some(slot) = slot {
            return slot;
        }

        let tomorrow = (t + Duration::days(1)).date();
        let first = self.times().next().unwrap_or_default();
        tomorrow.and_time(first)
    }

    /// Next wake slot after `now`, skipping a slot that is within `drift`.
    ///
    /// The drift check only looks at the first candidate; wraparound to the
    /// next day happens inside [`WakeHours::next_slot`].
    pub fn next_wake(&self, now: NaiveDateTime, drift: Duration) -> NaiveDateTime {
        let first = self.next_slot(now);
        let lead = first - now;
        if lead > Duration::zero() && lead <= drift {
            tracing::debug!(
                "Wake slot {} is {}s away (drift {}s), skipping",
                first,
                lead.num_seconds(),
                drift.num_seconds()
            );
            return self.next_slot(first + Duration::seconds(1));
        }
        first
    }
}

/// Compute the next wake time for raw hours in local civil time.
///
/// Fails with [`Error::Config`] if `hours` is empty or out of range.
pub fn next_wake(
    hours: &[u32],
    now: NaiveDateTime,
    drift: Duration,
) -> Result<NaiveDateTime, Error> {
    Ok(WakeHours::new(hours.iter().copied())?.next_wake(now, drift))
}

/// Wake hours bound to a timezone and drift window.
///
/// Converts a UTC `now` into local time, schedules there, and converts the
/// result back to UTC for transmission.
#[derive(Debug, Clone)]
pub struct WakeSchedule {
    hours: WakeHours,
    timezone: Tz,
    drift: Duration,
}

impl WakeSchedule {
    /// Create a schedule.
    pub fn new(hours: WakeHours, timezone: Tz, drift: Duration) -> Self {
        Self {
            hours,
            timezone,
            drift,
        }
    }

    /// Build a schedule from configuration strings.
    ///
    /// # Example
    ///
    /// ```
    /// use bloomin8_pull::schedule::WakeSchedule;
    ///
    /// let schedule = WakeSchedule::from_config("18, 6", "Europe/Berlin", 30).unwrap();
    /// assert_eq!(schedule.hours().hours(), &[6, 18]);
    /// ```
    pub fn from_config(hours: &str, timezone: &str, drift_minutes: u32) -> Result<Self, Error> {
        let hours = WakeHours::parse(hours)?;
        let timezone = parse_timezone(timezone)?;
        Ok(Self::new(
            hours,
            timezone,
            Duration::minutes(i64::from(drift_minutes)),
        ))
    }

    /// The wake grid.
    pub fn hours(&self) -> &WakeHours {
        &self.hours
    }

    /// The timezone wake hours are interpreted in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The drift window.
    pub fn drift(&self) -> Duration {
        self.drift
    }

    /// Next wake instant after `now`.
    pub fn next_wake_utc(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local_now = now.with_timezone(&self.timezone).naive_local();
        let local_wake = self.hours.next_wake(local_now, self.drift);
        self.to_utc(local_wake)
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        if let Some(dt) = self.timezone.from_local_datetime(&local).earliest() {
            return dt.with_timezone(&Utc);
        }
        // Inside a DST gap: the wall-clock hour does not exist, use the one after it.
        let shifted = local + Duration::hours(1);
        match self.timezone.from_local_datetime(&shifted).earliest() {
            Some(dt) => dt.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&local),
        }
    }
}

/// Parse an IANA timezone name (e.g. `"Europe/Berlin"`).
pub fn parse_timezone(name: &str) -> Result<Tz, Error> {
    name.parse::<Tz>()
        .map_err(|e| Error::Config(format!("Invalid timezone '{}': {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn grid() -> WakeHours {
        WakeHours::parse("6,18").unwrap()
    }

    #[test]
    fn test_parse_hours() {
        assert_eq!(WakeHours::parse("18,6,6").unwrap().hours(), &[6, 18]);
        assert_eq!(WakeHours::parse(" 7 , 0,23 ").unwrap().hours(), &[0, 7, 23]);
        assert_eq!(WakeHours::parse("12,").unwrap().hours(), &[12]);
    }

    #[test]
    fn test_parse_hours_rejects_bad_input() {
        assert!(matches!(WakeHours::parse("24"), Err(Error::Config(_))));
        assert!(matches!(WakeHours::parse("6,noon"), Err(Error::Config(_))));
        assert!(matches!(WakeHours::parse("-1"), Err(Error::Config(_))));
        assert!(matches!(WakeHours::parse(""), Err(Error::Config(_))));
        assert!(matches!(WakeHours::parse(" , "), Err(Error::Config(_))));
    }

    #[test]
    fn test_next_slot() {
        let hours = grid();
        assert_eq!(hours.next_slot(at(4, 5, 0)), at(4, 6, 0));
        // Strictly greater: a slot equal to `t` is not returned
        assert_eq!(hours.next_slot(at(4, 6, 0)), at(4, 18, 0));
        assert_eq!(hours.next_slot(at(4, 18, 0)), at(5, 6, 0));
        assert_eq!(hours.next_slot(at(4, 23, 59)), at(5, 6, 0));
    }

    #[test]
    fn test_next_slot_month_rollover() {
        let hours = grid();
        let t = NaiveDate::from_ymd_opt(2026, 12, 31)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2027, 1, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        assert_eq!(hours.next_slot(t), expected);
    }

    #[test]
    fn test_next_wake_far_from_slot() {
        assert_eq!(grid().next_wake(at(4, 8, 0), default_drift()), at(4, 18, 0));
    }

    #[test]
    fn test_next_wake_skips_imminent_slot() {
        assert_eq!(grid().next_wake(at(4, 17, 45), default_drift()), at(5, 6, 0));
        // Exactly on the drift boundary still counts as claimed
        assert_eq!(grid().next_wake(at(4, 17, 30), default_drift()), at(5, 6, 0));
        // Just outside the window keeps the slot
        assert_eq!(grid().next_wake(at(4, 17, 29), default_drift()), at(4, 18, 0));
    }

    #[test]
    fn test_next_wake_after_last_slot() {
        assert_eq!(grid().next_wake(at(4, 23, 0), default_drift()), at(5, 6, 0));
    }

    #[test]
    fn test_next_wake_drift_across_midnight() {
        // 05:45 is within drift of 06:00, so the evening slot is next
        assert_eq!(grid().next_wake(at(5, 5, 45), default_drift()), at(5, 18, 0));
    }

    #[test]
    fn test_next_wake_single_hour() {
        let hours = WakeHours::new([6]).unwrap();
        assert_eq!(hours.next_wake(at(4, 5, 45), default_drift()), at(5, 6, 0));
        assert_eq!(hours.next_wake(at(4, 5, 0), default_drift()), at(4, 6, 0));
    }

    #[test]
    fn test_next_wake_is_idempotent() {
        let hours = grid();
        let now = at(4, 17, 45);
        assert_eq!(
            hours.next_wake(now, default_drift()),
            hours.next_wake(now, default_drift())
        );
    }

    #[test]
    fn test_next_wake_empty_hours() {
        assert!(matches!(
            next_wake(&[], at(4, 12, 0), default_drift()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_next_wake_free_fn() {
        let wake = next_wake(&[18, 6, 18], at(4, 8, 0), default_drift()).unwrap();
        assert_eq!(wake, at(4, 18, 0));
    }

    #[test]
    fn test_schedule_utc_conversion() {
        // Berlin is UTC+2 in May: 15:45Z is 17:45 local, within drift of 18:00
        let schedule = WakeSchedule::from_config("6,18", "Europe/Berlin", 30).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 15, 45, 0).unwrap();
        let wake = schedule.next_wake_utc(now);
        assert_eq!(wake, Utc.with_ymd_and_hms(2026, 5, 5, 4, 0, 0).unwrap());
    }

    #[test]
    fn test_schedule_dst_gap() {
        // 02:00 does not exist in New York on 2026-03-08
        let schedule = WakeSchedule::from_config("2", "America/New_York", 30).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 8, 4, 0, 0).unwrap(); // 23:00 EST on the 7th
        let wake = schedule.next_wake_utc(now);
        assert_eq!(wake, Utc.with_ymd_and_hms(2026, 3, 8, 7, 0, 0).unwrap()); // 03:00 EDT
    }

    #[test]
    fn test_invalid_timezone() {
        assert!(matches!(
            WakeSchedule::from_config("6", "Mars/Olympus", 30),
            Err(Error::Config(_))
        ));
    }
}
