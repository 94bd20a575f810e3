use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Day,
    Week,
    Month,
}

/// A step of `every` units on the local calendar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeInterval {
    pub every: u32,
    pub unit: TimeUnit,
}

impl TimeInterval {
    pub fn new(every: u32, unit: TimeUnit) -> Self {
        Self { every, unit }
    }

    /// Steps forward once. Month steps clamp to the last day of a shorter
    /// target month instead of spilling into the next one.
    pub fn next_date(&self, from: NaiveDate) -> Option<NaiveDate> {
        let every = i64::from(self.every);
        match self.unit {
            TimeUnit::Day => from.checked_add_signed(Duration::try_days(every)?),
            TimeUnit::Week => from.checked_add_signed(Duration::try_weeks(every)?),
            TimeUnit::Month => shift_month(from, i32::try_from(self.every).ok()?),
        }
    }

    /// Month steps that aim for `anchor_day` (clamped) rather than the day of `from`.
    pub fn next_date_anchored(&self, from: NaiveDate, anchor_day: u32) -> Option<NaiveDate> {
        match self.unit {
            TimeUnit::Month => {
                let first = from.with_day(1)?;
                let target = shift_month(first, self.every as i32)?;
                clamp_ymd(target.year(), target.month(), anchor_day)
            }
            _ => self.next_date(from),
        }
    }

    pub fn label(&self) -> String {
        match (self.every, self.unit) {
            (1, TimeUnit::Day) => "Daily".into(),
            (1, TimeUnit::Week) => "Weekly".into(),
            (1, TimeUnit::Month) => "Monthly".into(),
            (n, unit) => format!("Every {} {:?}s", n, unit),
        }
    }
}

/// Moves `date` by whole calendar months, clamping the day of month.
pub fn shift_month(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    if months >= 0 {
        date.checked_add_months(Months::new(months as u32))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    }
}

/// Builds a date, clamping `day` into the month's valid range.
pub fn clamp_ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let first_next = shift_month(first, 1)?;
    Some((first_next - first).num_days() as u32)
}
