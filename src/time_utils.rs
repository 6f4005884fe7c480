// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and the injected clock.
//!
//! Engines never read the system time directly. "Today" is the user-local
//! calendar date, derived from a fixed UTC offset, so streaks and the daily
//! spin cap roll over at local midnight.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, SecondsFormat, TimeZone, Utc};
use std::sync::Mutex;

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
///
/// Second precision keeps stored timestamps lexically ordered.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Source of "now" and the user-local "today".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// UTC offset of the users' calendar.
    fn offset(&self) -> FixedOffset;

    /// Current user-local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.offset()).date_naive()
    }

    /// `now()` formatted for storage.
    fn now_rfc3339(&self) -> String {
        format_utc_rfc3339(self.now())
    }

    /// Local midnight at the start of tomorrow, as a stored timestamp.
    fn start_of_tomorrow(&self) -> String {
        let tomorrow = self.today() + Duration::days(1);
        let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default();
        match self.offset().from_local_datetime(&midnight).single() {
            Some(local) => format_utc_rfc3339(local.with_timezone(&Utc)),
            None => format_utc_rfc3339(Utc.from_utc_datetime(&midnight)),
        }
    }
}

/// Wall clock with a fixed user-local UTC offset.
#[derive(Debug, Clone)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    /// Offsets outside ±23 hours fall back to UTC.
    pub fn new(utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Settable clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    /// A clock frozen at `now`, with a UTC user calendar.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            offset: Utc.fix(),
        }
    }

    /// A clock frozen at 12:00 UTC on the given date.
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default();
        Self::new(Utc.from_utc_datetime(&noon))
    }

    pub fn with_offset(mut self, utc_offset_hours: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(utc_offset_hours * 3600) {
            self.offset = offset;
        }
        self
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_utc_rfc3339_uses_z_suffix() {
        let date = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 15).unwrap();
        assert_eq!(format_utc_rfc3339(date), "2026-03-01T08:30:15Z");
    }

    #[test]
    fn test_today_follows_user_offset() {
        // 20:00 UTC on March 1st is already March 2nd at UTC+9
        let clock =
            FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()).with_offset(9);

        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(clock.start_of_tomorrow(), "2026-03-02T15:00:00Z");
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        clock.advance_days(1);

        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(clock.now_rfc3339(), "2026-03-01T12:00:00Z");
    }
}
