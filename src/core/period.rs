//! Budget cycle boundaries anchored to a weekday, day of month or date of year.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::calendar::{week_start_date, CalendarPolicy};
use crate::errors::{EngineError, Result};
use crate::ledger::time_interval::{clamp_ymd, shift_month};
use crate::ledger::{Budget, BudgetAnchor, BudgetKind};

/// Half-open `[start, end)` window between two local midnights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CycleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CycleWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PeriodCalculator {
    policy: CalendarPolicy,
}

impl PeriodCalculator {
    pub fn new(policy: CalendarPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CalendarPolicy {
        &self.policy
    }

    /// The cycle containing `now`: `start <= now < end`, exactly one unit long.
    pub fn cycle(&self, kind: BudgetKind, anchor: &BudgetAnchor, now: DateTime<Utc>) -> Result<CycleWindow> {
        anchor.validate_for(kind)?;
        let today = self.policy.local_date(now);
        let (start, end) = cycle_dates(&self.policy, kind, anchor, today)
            .ok_or_else(|| EngineError::OutOfRange(format!("no {kind:?} cycle around {today}")))?;
        Ok(CycleWindow {
            start: self.policy.midnight(start),
            end: self.policy.midnight(end),
        })
    }

    pub fn cycle_for(&self, budget: &Budget, now: DateTime<Utc>) -> Result<CycleWindow> {
        self.cycle(budget.kind, &budget.anchor, now)
    }

    pub fn previous(&self, kind: BudgetKind, anchor: &BudgetAnchor, window: &CycleWindow) -> Result<CycleWindow> {
        self.cycle(kind, anchor, window.start - Duration::seconds(1))
    }

    pub fn next(&self, kind: BudgetKind, anchor: &BudgetAnchor, window: &CycleWindow) -> Result<CycleWindow> {
        self.cycle(kind, anchor, window.end)
    }

    /// Fraction of the cycle consumed at `now`, clamped to `[0, 1]`.
    pub fn percent_elapsed(window: &CycleWindow, now: DateTime<Utc>) -> f64 {
        let total = window.duration().num_milliseconds();
        if total <= 0 {
            return 0.0;
        }
        let elapsed = (now - window.start).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }
}

fn cycle_dates(
    policy: &CalendarPolicy,
    kind: BudgetKind,
    anchor: &BudgetAnchor,
    today: NaiveDate,
) -> Option<(NaiveDate, NaiveDate)> {
    match (kind, anchor) {
        (BudgetKind::Day, _) => Some((today, today.succ_opt()?)),
        (BudgetKind::Week, BudgetAnchor::Weekday(weekday)) => {
            let week_start = week_start_date(today, policy.first_weekday());
            let offset = (*weekday as i64 - policy.first_weekday() as i64).rem_euclid(7);
            let mut start = week_start + Duration::days(offset);
            if start > today {
                start -= Duration::days(7);
            }
            Some((start, start + Duration::days(7)))
        }
        (BudgetKind::Month, BudgetAnchor::DayOfMonth(day)) => {
            let day = *day as u32;
            let mut start = clamp_ymd(today.year(), today.month(), day)?;
            if start > today {
                let previous = shift_month(today.with_day(1)?, -1)?;
                start = clamp_ymd(previous.year(), previous.month(), day)?;
            }
            let following = shift_month(start.with_day(1)?, 1)?;
            Some((start, clamp_ymd(following.year(), following.month(), day)?))
        }
        (BudgetKind::Year, BudgetAnchor::DateOfYear(date)) => {
            let (month, day) = (date.month(), date.day());
            let mut start = clamp_ymd(today.year(), month, day)?;
            if start > today {
                start = clamp_ymd(today.year() - 1, month, day)?;
            }
            Some((start, clamp_ymd(start.year() + 1, month, day)?))
        }
        _ => None,
    }
}
