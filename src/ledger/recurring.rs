use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::time_interval::{TimeInterval, TimeUnit};
use super::transaction::TransactionDraft;
use crate::errors::{EngineError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum RecurrenceKind {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// How often a recurring transaction repeats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub kind: RecurrenceKind,
    pub coefficient: u32,
    #[serde(default = "RecurrenceRule::default_active")]
    pub active: bool,
    /// Day of month monthly steps aim for, so a series started on the 31st
    /// returns to the 31st after passing through a shorter month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_day: Option<u32>,
}

impl RecurrenceRule {
    pub fn new(kind: RecurrenceKind, coefficient: u32) -> Result<Self> {
        if coefficient == 0 {
            return Err(EngineError::InvalidRule(
                "coefficient must be at least 1".into(),
            ));
        }
        Ok(Self {
            kind,
            coefficient,
            active: kind != RecurrenceKind::None,
            anchor_day: None,
        })
    }

    pub fn daily(coefficient: u32) -> Result<Self> {
        Self::new(RecurrenceKind::Daily, coefficient)
    }

    pub fn weekly(coefficient: u32) -> Result<Self> {
        Self::new(RecurrenceKind::Weekly, coefficient)
    }

    pub fn monthly(coefficient: u32) -> Result<Self> {
        Self::new(RecurrenceKind::Monthly, coefficient)
    }

    pub fn anchored_to(mut self, day: u32) -> Self {
        if self.kind == RecurrenceKind::Monthly {
            self.anchor_day = Some(day.clamp(1, 31));
        }
        self
    }

    /// The calendar step this rule takes, `None` for non-recurring rules.
    pub fn interval(&self) -> Option<TimeInterval> {
        let unit = match self.kind {
            RecurrenceKind::None => return None,
            RecurrenceKind::Daily => TimeUnit::Day,
            RecurrenceKind::Weekly => TimeUnit::Week,
            RecurrenceKind::Monthly => TimeUnit::Month,
        };
        Some(TimeInterval::new(self.coefficient.max(1), unit))
    }

    pub fn is_recurring(&self) -> bool {
        self.active && self.kind != RecurrenceKind::None && self.coefficient >= 1
    }

    pub fn label(&self) -> String {
        self.interval()
            .map(|interval| interval.label())
            .unwrap_or_else(|| "One-off".into())
    }

    fn default_active() -> bool {
        true
    }
}

/// Next-due state of a recurring transaction, kept apart from the
/// transactions it has already produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringSchedule {
    pub id: Uuid,
    pub template: TransactionDraft,
    pub rule: RecurrenceRule,
    pub next_due: DateTime<Utc>,
    #[serde(default)]
    pub materialized: u32,
}

impl RecurringSchedule {
    pub fn new(template: TransactionDraft, rule: RecurrenceRule, first_due: DateTime<Utc>) -> Result<Self> {
        template.validate()?;
        if rule.kind == RecurrenceKind::None {
            return Err(EngineError::InvalidRule(
                "a recurring schedule needs a daily, weekly or monthly rule".into(),
            ));
        }
        if rule.coefficient == 0 {
            return Err(EngineError::InvalidRule(
                "coefficient must be at least 1".into(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            template,
            rule,
            next_due: first_due,
            materialized: 0,
        })
    }

    pub fn is_active(&self) -> bool {
        self.rule.is_recurring()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.next_due <= now
    }

    pub fn cancel(&mut self) {
        self.rule.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_coefficient_is_rejected() {
        assert!(matches!(
            RecurrenceRule::weekly(0),
            Err(EngineError::InvalidRule(_))
        ));
    }

    #[test]
    fn none_rule_never_recurs() {
        let rule = RecurrenceRule::new(RecurrenceKind::None, 1).unwrap();
        assert!(!rule.is_recurring());
        assert!(rule.interval().is_none());
        assert_eq!(rule.label(), "One-off");
        let schedule = RecurringSchedule::new(TransactionDraft::expense(dec!(5)), rule, Utc::now());
        assert!(matches!(schedule, Err(EngineError::InvalidRule(_))));
    }

    #[test]
    fn cancelled_schedule_is_never_due() {
        let due = Utc::now();
        let mut schedule = RecurringSchedule::new(
            TransactionDraft::expense(dec!(9.99)),
            RecurrenceRule::monthly(1).unwrap(),
            due,
        )
        .unwrap();
        assert!(schedule.is_due(due));
        schedule.cancel();
        assert!(!schedule.is_due(due));
    }

    #[test]
    fn anchor_day_only_applies_to_monthly_rules() {
        assert_eq!(RecurrenceRule::monthly(1).unwrap().anchored_to(31).anchor_day, Some(31));
        assert_eq!(RecurrenceRule::weekly(1).unwrap().anchored_to(31).anchor_day, None);
        assert_eq!(RecurrenceRule::weekly(2).unwrap().label(), "Every 2 Weeks");
    }
}
