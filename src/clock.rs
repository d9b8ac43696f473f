//! Usage-day computation.
//!
//! Daily counters reset implicitly by being keyed on a calendar date, so the
//! "current day" has to be a deliberate, configurable computation rather than
//! an ambient clock read inside the evaluator. The server constructs one
//! [`DayClock`] from configuration and hands it to the handlers.

use anyhow::{anyhow, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Converts instants to calendar days in a fixed UTC offset.
#[derive(Clone, Copy, Debug)]
pub struct DayClock {
    offset: FixedOffset,
}

impl DayClock {
    /// Builds a clock for the given offset east of UTC, in minutes.
    ///
    /// # Errors
    /// Returns an error when the offset is outside `-1439..=1439` minutes.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(minutes * 60)
            .ok_or_else(|| anyhow!("invalid day offset: {minutes} minutes"))?;
        Ok(Self { offset })
    }

    /// The calendar day `instant` falls on in this clock's offset.
    #[must_use]
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Today's usage day.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().unwrap()
    }

    #[test]
    fn utc_clock_uses_utc_date() {
        let clock = DayClock::from_offset_minutes(0).unwrap();
        let date = clock.date_of(utc(2024, 6, 1, 23, 59));
        assert_eq!(date.to_string(), "2024-06-01");
    }

    #[test]
    fn positive_offset_rolls_the_day_forward() {
        // UTC+3 (Riyadh): 22:30 UTC is already the next day locally.
        let clock = DayClock::from_offset_minutes(180).unwrap();
        let date = clock.date_of(utc(2024, 6, 1, 22, 30));
        assert_eq!(date.to_string(), "2024-06-02");
    }

    #[test]
    fn negative_offset_rolls_the_day_back() {
        let clock = DayClock::from_offset_minutes(-300).unwrap();
        let date = clock.date_of(utc(2024, 6, 1, 2, 0));
        assert_eq!(date.to_string(), "2024-05-31");
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        assert!(DayClock::from_offset_minutes(24 * 60).is_err());
        assert!(DayClock::from_offset_minutes(-24 * 60).is_err());
    }

    #[test]
    fn day_key_format_is_iso_date() {
        let clock = DayClock::from_offset_minutes(0).unwrap();
        let date = clock.date_of(utc(2024, 1, 9, 12, 0));
        assert_eq!(date.format("%Y-%m-%d").to_string(), "2024-01-09");
    }
}
