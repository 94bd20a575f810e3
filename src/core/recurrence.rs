//! Forward projection of recurring transaction due dates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::calendar::CalendarPolicy;
use crate::ledger::{RecurrenceKind, RecurrenceRule, RecurringSchedule, TransactionDraft};

const MAX_UPCOMING_PER_SCHEDULE: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct RecurrenceProjector {
    policy: CalendarPolicy,
}

/// One projected, not yet materialized, occurrence of a schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpcomingOccurrence {
    pub schedule_id: Uuid,
    pub due: DateTime<Utc>,
    pub template: TransactionDraft,
    pub label: String,
}

impl RecurrenceProjector {
    pub fn new(policy: CalendarPolicy) -> Self {
        Self { policy }
    }

    /// Steps `coefficient` units of the rule's kind past `after`, keeping the
    /// local time of day. `None` when the rule does not recur or the result
    /// leaves the representable calendar.
    pub fn next_occurrence(&self, after: DateTime<Utc>, rule: &RecurrenceRule) -> Option<DateTime<Utc>> {
        if rule.kind == RecurrenceKind::None || rule.coefficient == 0 {
            return None;
        }
        let interval = rule.interval()?;
        let local = self.policy.local(after);
        let date = match rule.anchor_day {
            Some(day) => interval.next_date_anchored(local.date(), day)?,
            None => interval.next_date(local.date())?,
        };
        Some(self.policy.to_instant(date.and_time(local.time())))
    }

    /// Lazily yields every due date after `start` up to and including `limit`.
    pub fn occurrences_up_to(
        &self,
        start: DateTime<Utc>,
        rule: &RecurrenceRule,
        limit: DateTime<Utc>,
    ) -> Occurrences {
        Occurrences {
            projector: *self,
            rule: *rule,
            cursor: start,
            limit,
            done: !rule.is_recurring(),
        }
    }

    /// Due dates of every active schedule up to `until`, including the
    /// schedule's pending `next_due`, sorted by date.
    pub fn upcoming(&self, schedules: &[RecurringSchedule], until: DateTime<Utc>) -> Vec<UpcomingOccurrence> {
        let mut upcoming = Vec::new();
        for schedule in schedules.iter().filter(|s| s.is_active()) {
            if schedule.next_due > until {
                continue;
            }
            let dues = std::iter::once(schedule.next_due)
                .chain(self.occurrences_up_to(schedule.next_due, &schedule.rule, until))
                .take(MAX_UPCOMING_PER_SCHEDULE);
            for due in dues {
                upcoming.push(UpcomingOccurrence {
                    schedule_id: schedule.id,
                    due,
                    template: schedule.template.clone(),
                    label: schedule.rule.label(),
                });
            }
        }
        upcoming.sort_by_key(|item| (item.due, item.schedule_id));
        upcoming
    }
}

/// Restartable iterator over due dates; a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct Occurrences {
    projector: RecurrenceProjector,
    rule: RecurrenceRule,
    cursor: DateTime<Utc>,
    limit: DateTime<Utc>,
    done: bool,
}

impl Iterator for Occurrences {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.projector.next_occurrence(self.cursor, &self.rule) {
            Some(next) if next <= self.limit && next > self.cursor => {
                self.cursor = next;
                Some(next)
            }
            _ => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn projector() -> RecurrenceProjector {
        RecurrenceProjector::new(CalendarPolicy::default())
    }

    #[test]
    fn month_step_clamps_to_end_of_february() {
        let monthly = RecurrenceRule::monthly(1).unwrap();
        assert_eq!(
            projector().next_occurrence(at(2023, 1, 31, 9), &monthly),
            Some(at(2023, 2, 28, 9))
        );
        assert_eq!(
            projector().next_occurrence(at(2024, 1, 31, 9), &monthly),
            Some(at(2024, 2, 29, 9))
        );
    }

    #[test]
    fn coefficient_scales_the_step() {
        let fortnightly = RecurrenceRule::weekly(2).unwrap();
        assert_eq!(
            projector().next_occurrence(at(2024, 5, 1, 18), &fortnightly),
            Some(at(2024, 5, 15, 18))
        );
        let every_third_day = RecurrenceRule::daily(3).unwrap();
        assert_eq!(
            projector().next_occurrence(at(2024, 2, 27, 0), &every_third_day),
            Some(at(2024, 3, 1, 0))
        );
    }

    #[test]
    fn keeps_local_time_of_day() {
        let policy = CalendarPolicy::new(1, 1, 120).unwrap();
        let projector = RecurrenceProjector::new(policy);
        // 23:30 UTC on March 30th is 01:30 local on March 31st.
        let after = Utc.with_ymd_and_hms(2024, 3, 30, 23, 30, 0).unwrap();
        let next = projector
            .next_occurrence(after, &RecurrenceRule::monthly(1).unwrap())
            .unwrap();
        // April 30th 01:30 local.
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 4, 29, 23, 30, 0).unwrap());
    }

    #[test]
    fn occurrences_stop_at_limit_and_restart_identically() {
        let weekly = RecurrenceRule::weekly(1).unwrap();
        let start = at(2024, 1, 1, 12);
        let limit = start + Duration::days(22);
        let first: Vec<_> = projector().occurrences_up_to(start, &weekly, limit).collect();
        let second: Vec<_> = projector().occurrences_up_to(start, &weekly, limit).collect();
        assert_eq!(first, vec![at(2024, 1, 8, 12), at(2024, 1, 15, 12), at(2024, 1, 22, 12)]);
        assert_eq!(first, second);
    }

    #[test]
    fn inactive_rule_yields_nothing() {
        let mut rule = RecurrenceRule::daily(1).unwrap();
        rule.active = false;
        let start = at(2024, 1, 1, 0);
        assert_eq!(projector().occurrences_up_to(start, &rule, start + Duration::days(5)).count(), 0);
        let none = RecurrenceRule::new(RecurrenceKind::None, 1).unwrap();
        assert_eq!(projector().next_occurrence(start, &none), None);
    }

    #[test]
    fn anchored_monthly_rule_does_not_drift() {
        let rule = RecurrenceRule::monthly(1).unwrap().anchored_to(31);
        let dues: Vec<_> = projector()
            .occurrences_up_to(at(2023, 1, 31, 8), &rule, at(2023, 5, 1, 0))
            .collect();
        assert_eq!(
            dues,
            vec![at(2023, 2, 28, 8), at(2023, 3, 31, 8), at(2023, 4, 30, 8)]
        );
    }

    #[test]
    fn upcoming_lists_pending_and_projected_dates() {
        let schedule = RecurringSchedule::new(
            TransactionDraft::expense(dec!(15)),
            RecurrenceRule::weekly(1).unwrap(),
            at(2024, 6, 3, 9),
        )
        .unwrap();
        let upcoming = projector().upcoming(&[schedule.clone()], at(2024, 6, 17, 9));
        let dues: Vec<_> = upcoming.iter().map(|item| item.due).collect();
        assert_eq!(dues, vec![at(2024, 6, 3, 9), at(2024, 6, 10, 9), at(2024, 6, 17, 9)]);
        assert!(upcoming.iter().all(|item| item.schedule_id == schedule.id));
        assert_eq!(upcoming[0].label, "Weekly");
    }
}
