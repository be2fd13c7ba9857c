// =============================================================================
// Market hours — Eastern-time trading session calculator (equities)
// =============================================================================
//
// Crypto agents ignore this entirely; only equities-hunting cycles gate on
// it. Sessions follow the standard US equities calendar: pre-market opens
// 04:00 ET, regular session 09:30 to close, after-hours runs until 20:00 ET,
// closed covers every other weekday hour, and weekend/holiday override
// everything. `close` is 13:00 ET on an early-close day, else 16:00 ET.
//
// The holiday and early-close calendars below are a fixed, enumerated list
// rather than a computed one (Good Friday and Thanksgiving don't fall on a
// formula-friendly weekday offset worth deriving here). To extend either
// calendar for a new year, add a `NaiveDate` literal to the matching const
// array below.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    Closed,
    PreMarket,
    Regular,
    AfterHours,
    Weekend,
    Holiday,
}

impl MarketSession {
    pub fn is_regular(self) -> bool {
        matches!(self, MarketSession::Regular)
    }
}

/// Full-day market closures. Extend with a `NaiveDate` literal per new
/// holiday as calendars are published for future years.
const HOLIDAYS: &[(i32, u32, u32)] = &[
    // 2025
    (2025, 1, 1),   // New Year's Day
    (2025, 1, 20),  // Martin Luther King Jr. Day
    (2025, 2, 17),  // Washington's Birthday
    (2025, 4, 18),  // Good Friday
    (2025, 5, 26),  // Memorial Day
    (2025, 6, 19),  // Juneteenth
    (2025, 7, 4),   // Independence Day
    (2025, 9, 1),   // Labor Day
    (2025, 11, 27), // Thanksgiving
    (2025, 12, 25), // Christmas
    // 2026
    (2026, 1, 1),
    (2026, 1, 19),
    (2026, 2, 16),
    (2026, 4, 3),
    (2026, 5, 25),
    (2026, 6, 19),
    (2026, 7, 3), // observed
    (2026, 9, 7),
    (2026, 11, 26),
    (2026, 12, 25),
];

/// Days the regular session closes at 13:00 ET instead of 16:00.
const EARLY_CLOSE_DAYS: &[(i32, u32, u32)] = &[
    (2025, 7, 3),
    (2025, 11, 28),
    (2025, 12, 24),
    (2026, 11, 27),
    (2026, 12, 24),
];

fn is_listed(calendar: &[(i32, u32, u32)], date: NaiveDate) -> bool {
    calendar
        .iter()
        .any(|&(y, m, d)| (y, m, d) == (date.year(), date.month(), date.day()))
}

/// Classify `instant` (any timezone) into the equities trading session it
/// falls within, in US Eastern time.
pub fn session_at(instant: DateTime<Utc>) -> MarketSession {
    let et: DateTime<Tz> = instant.with_timezone(&New_York);
    let date = et.date_naive();
    let weekday = et.weekday();

    if matches!(weekday, Weekday::Sat | Weekday::Sun) {
        return MarketSession::Weekend;
    }
    if is_listed(HOLIDAYS, date) {
        return MarketSession::Holiday;
    }

    let time = et.time();
    let pre_market_open = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
    let regular_open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let after_hours_close = NaiveTime::from_hms_opt(20, 0, 0).unwrap();
    let close = if is_listed(EARLY_CLOSE_DAYS, date) {
        NaiveTime::from_hms_opt(13, 0, 0).unwrap()
    } else {
        NaiveTime::from_hms_opt(16, 0, 0).unwrap()
    };

    if time < pre_market_open || time >= after_hours_close {
        MarketSession::Closed
    } else if time < regular_open {
        MarketSession::PreMarket
    } else if time < close {
        MarketSession::Regular
    } else {
        MarketSession::AfterHours
    }
}

pub fn is_regular_session(instant: DateTime<Utc>) -> bool {
    session_at(instant).is_regular()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc_from_et(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        let naive = NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap();
        New_York.from_local_datetime(&naive).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn regular_session_midday() {
        // Wednesday, not a holiday.
        let t = utc_from_et(2025, 6, 4, 11, 0);
        assert_eq!(session_at(t), MarketSession::Regular);
    }

    #[test]
    fn pre_market_before_open() {
        let t = utc_from_et(2025, 6, 4, 6, 0);
        assert_eq!(session_at(t), MarketSession::PreMarket);
    }

    #[test]
    fn after_hours_past_close() {
        let t = utc_from_et(2025, 6, 4, 17, 0);
        assert_eq!(session_at(t), MarketSession::AfterHours);
    }

    #[test]
    fn weekend_is_closed() {
        let t = utc_from_et(2025, 6, 7, 11, 0); // Saturday
        assert_eq!(session_at(t), MarketSession::Weekend);
    }

    #[test]
    fn named_holiday_overrides_weekday() {
        let t = utc_from_et(2025, 12, 25, 11, 0);
        assert_eq!(session_at(t), MarketSession::Holiday);
    }

    #[test]
    fn early_close_day_shortens_regular_session() {
        let before_close = utc_from_et(2025, 12, 24, 12, 30);
        assert_eq!(session_at(before_close), MarketSession::Regular);
        let after_close = utc_from_et(2025, 12, 24, 13, 30);
        assert_eq!(session_at(after_close), MarketSession::AfterHours);
    }

    #[test]
    fn is_regular_session_helper() {
        let t = utc_from_et(2025, 6, 4, 11, 0);
        assert!(is_regular_session(t));
    }
}
