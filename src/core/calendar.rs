//! Local-calendar boundary math configured by the user's week and month preferences.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc, Weekday,
};

use crate::errors::{EngineError, Result};
use crate::ledger::time_interval::{clamp_ymd, shift_month};

pub const DEFAULT_FIRST_WEEKDAY: u8 = 1;
pub const DEFAULT_FIRST_DAY_OF_MONTH: u8 = 1;
const MAX_FIRST_DAY_OF_MONTH: u8 = 28;
const MIN_DAYS_IN_FIRST_WEEK: i64 = 4;

/// Calendar preferences injected into every engine component.
///
/// Weekdays are numbered 1..=7 starting at Sunday. The local calendar is a fixed
/// offset from UTC; every boundary is a local midnight expressed as a UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarPolicy {
    first_weekday: u8,
    first_day_of_month: u8,
    utc_offset_seconds: i32,
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self {
            first_weekday: DEFAULT_FIRST_WEEKDAY,
            first_day_of_month: DEFAULT_FIRST_DAY_OF_MONTH,
            utc_offset_seconds: 0,
        }
    }
}

impl CalendarPolicy {
    pub fn new(first_weekday: u8, first_day_of_month: u8, utc_offset_minutes: i32) -> Result<Self> {
        weekday_from_number(first_weekday)?;
        if !(1..=MAX_FIRST_DAY_OF_MONTH).contains(&first_day_of_month) {
            return Err(EngineError::InvalidAnchor(format!(
                "first day of month must be within 1..={MAX_FIRST_DAY_OF_MONTH}, got {first_day_of_month}"
            )));
        }
        let utc_offset_seconds = utc_offset_minutes
            .checked_mul(60)
            .filter(|secs| FixedOffset::east_opt(*secs).is_some())
            .ok_or_else(|| {
                EngineError::Config(format!("utc offset of {utc_offset_minutes} minutes is invalid"))
            })?;
        Ok(Self {
            first_weekday,
            first_day_of_month,
            utc_offset_seconds,
        })
    }

    pub fn first_weekday(&self) -> u8 {
        self.first_weekday
    }

    pub fn first_day_of_month(&self) -> u8 {
        self.first_day_of_month
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_seconds).unwrap_or_else(|| Utc.fix())
    }

    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset()).naive_local()
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date()
    }

    /// Converts a local wall-clock time back to the UTC instant it denotes.
    pub fn to_instant(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let utc = local - Duration::seconds(self.utc_offset_seconds as i64);
        Utc.from_utc_datetime(&utc)
    }

    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.to_instant(date.and_time(NaiveTime::MIN))
    }

    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(self.local_date(instant))
    }

    pub fn start_of_week(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        self.midnight(week_start_date(self.local_date(instant), self.first_weekday))
    }

    pub fn start_of_week_on(&self, instant: DateTime<Utc>, first_weekday: u8) -> Result<DateTime<Utc>> {
        weekday_from_number(first_weekday)?;
        Ok(self.midnight(week_start_date(self.local_date(instant), first_weekday)))
    }

    /// Start of the billing month that contains `instant`.
    pub fn start_of_month(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(instant);
        let start = month_start_date(date, self.first_day_of_month as u32).unwrap_or(date);
        self.midnight(start)
    }

    /// Like [`Self::start_of_month`] with an explicit billing day.
    pub fn start_of_month_on(&self, instant: DateTime<Utc>, first_day_of_month: u8) -> Result<DateTime<Utc>> {
        if !(1..=MAX_FIRST_DAY_OF_MONTH).contains(&first_day_of_month) {
            return Err(EngineError::InvalidAnchor(format!(
                "first day of month must be within 1..={MAX_FIRST_DAY_OF_MONTH}, got {first_day_of_month}"
            )));
        }
        let date = self.local_date(instant);
        let start = month_start_date(date, first_day_of_month as u32)
            .ok_or_else(|| EngineError::OutOfRange(date.to_string()))?;
        Ok(self.midnight(start))
    }

    /// Start of the calendar month (day 1), independent of the billing day.
    pub fn start_of_calendar_month(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(instant);
        self.midnight(date.with_day(1).unwrap_or(date))
    }

    pub fn start_of_year(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(instant);
        self.midnight(date.with_ordinal(1).unwrap_or(date))
    }

    /// Week number using the minimum-four-days rule: week 1 is the first week
    /// beginning on `first_weekday` that has at least four days in the new year.
    pub fn week_of_year(&self, instant: DateTime<Utc>) -> (i32, u32) {
        let date = self.local_date(instant);
        let year = date.year();
        let mut week_year = year;
        let mut week_one = self.first_week_start(year);
        if let Some(following) = self.first_week_start_opt(year + 1) {
            if date >= following {
                week_year = year + 1;
                week_one = following;
            }
        }
        if date < week_one {
            week_year = year - 1;
            week_one = self.first_week_start(year - 1);
        }
        let week = (date - week_one).num_days() / 7 + 1;
        (week_year, week as u32)
    }

    fn first_week_start(&self, year: i32) -> NaiveDate {
        self.first_week_start_opt(year).unwrap_or(NaiveDate::MIN)
    }

    fn first_week_start_opt(&self, year: i32) -> Option<NaiveDate> {
        let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let start = week_start_date(jan_first, self.first_weekday);
        let days_in_new_year = 7 - (jan_first - start).num_days();
        if days_in_new_year >= MIN_DAYS_IN_FIRST_WEEK {
            Some(start)
        } else {
            start.checked_add_signed(Duration::days(7))
        }
    }
}

/// Parses a 1..=7 weekday number where 1 is Sunday.
pub fn weekday_from_number(number: u8) -> Result<Weekday> {
    match number {
        1 => Ok(Weekday::Sun),
        2 => Ok(Weekday::Mon),
        3 => Ok(Weekday::Tue),
        4 => Ok(Weekday::Wed),
        5 => Ok(Weekday::Thu),
        6 => Ok(Weekday::Fri),
        7 => Ok(Weekday::Sat),
        other => Err(EngineError::InvalidAnchor(format!(
            "weekday must be within 1..=7, got {other}"
        ))),
    }
}

pub fn weekday_number(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8 + 1
}

pub(crate) fn week_start_date(date: NaiveDate, first_weekday: u8) -> NaiveDate {
    let today = date.weekday().num_days_from_sunday() as i64;
    let first = (first_weekday as i64 - 1).rem_euclid(7);
    let back = (today - first).rem_euclid(7);
    date - Duration::days(back)
}

pub(crate) fn month_start_date(date: NaiveDate, day: u32) -> Option<NaiveDate> {
    let this_month = clamp_ymd(date.year(), date.month(), day)?;
    if this_month <= date {
        return Some(this_month);
    }
    let previous = shift_month(date.with_day(1)?, -1)?;
    clamp_ymd(previous.year(), previous.month(), day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn rejects_out_of_range_settings() {
        assert!(matches!(
            CalendarPolicy::new(0, 1, 0),
            Err(EngineError::InvalidAnchor(_))
        ));
        assert!(matches!(
            CalendarPolicy::new(8, 1, 0),
            Err(EngineError::InvalidAnchor(_))
        ));
        assert!(matches!(
            CalendarPolicy::new(1, 29, 0),
            Err(EngineError::InvalidAnchor(_))
        ));
        assert!(CalendarPolicy::new(7, 28, -300).is_ok());
    }

    #[test]
    fn start_of_day_uses_local_calendar() {
        // 02:00 UTC on the 10th is still the 9th at UTC-5.
        let policy = CalendarPolicy::new(1, 1, -300).unwrap();
        let start = policy.start_of_day(at(2024, 3, 10, 2));
        assert_eq!(start, at(2024, 3, 9, 5));
    }

    #[test]
    fn start_of_week_respects_first_weekday() {
        let sunday_first = CalendarPolicy::default();
        // 2024-05-15 is a Wednesday.
        let wednesday = at(2024, 5, 15, 13);
        assert_eq!(sunday_first.start_of_week(wednesday), at(2024, 5, 12, 0));
        assert_eq!(
            sunday_first.start_of_week_on(wednesday, 2).unwrap(),
            at(2024, 5, 13, 0)
        );
        assert_eq!(
            sunday_first.start_of_week_on(wednesday, 4).unwrap(),
            at(2024, 5, 15, 0)
        );
    }

    #[test]
    fn start_of_month_follows_billing_day() {
        let policy = CalendarPolicy::new(1, 15, 0).unwrap();
        assert_eq!(policy.start_of_month(at(2024, 5, 20, 8)), at(2024, 5, 15, 0));
        assert_eq!(policy.start_of_month(at(2024, 5, 3, 8)), at(2024, 4, 15, 0));
        assert_eq!(policy.start_of_month(at(2024, 1, 3, 8)), at(2023, 12, 15, 0));
        assert_eq!(policy.start_of_month_on(at(2024, 3, 9, 8), 10).unwrap(), at(2024, 2, 10, 0));
        assert_eq!(policy.start_of_month_on(at(2024, 3, 10, 0), 10).unwrap(), at(2024, 3, 10, 0));
        assert!(matches!(
            policy.start_of_month_on(at(2024, 3, 10, 0), 29),
            Err(EngineError::InvalidAnchor(_))
        ));
        assert_eq!(policy.start_of_calendar_month(at(2024, 5, 3, 8)), at(2024, 5, 1, 0));
    }

    #[test]
    fn start_of_year_is_january_first() {
        let policy = CalendarPolicy::default();
        assert_eq!(policy.start_of_year(at(2024, 7, 4, 12)), at(2024, 1, 1, 0));
    }

    #[test]
    fn week_numbers_use_four_day_rule() {
        // Monday-first weeks reproduce ISO numbering.
        let iso = CalendarPolicy::new(2, 1, 0).unwrap();
        assert_eq!(iso.week_of_year(at(2021, 1, 1, 12)), (2020, 53));
        assert_eq!(iso.week_of_year(at(2021, 1, 4, 12)), (2021, 1));
        assert_eq!(iso.week_of_year(at(2024, 12, 30, 12)), (2025, 1));
        assert_eq!(iso.week_of_year(at(2024, 6, 14, 12)), (2024, 24));
    }
}
