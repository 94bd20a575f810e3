use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::calendar::{weekday_from_number, weekday_number};
use crate::errors::{EngineError, Result};

/// Length of one budget cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BudgetKind {
    Day,
    Week,
    Month,
    Year,
}

/// Day a budget cycle aligns to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BudgetAnchor {
    /// Daily cycles start at local midnight.
    Midnight,
    /// Weekday 1..=7, Sunday = 1.
    Weekday(u8),
    /// Day of month 1..=31, clamped in shorter months.
    DayOfMonth(u8),
    /// Month and day of a full date; the year is ignored.
    DateOfYear(NaiveDate),
}

impl BudgetAnchor {
    /// Derives the anchor a budget started on `start` would use.
    pub fn from_start_date(kind: BudgetKind, start: NaiveDate) -> Self {
        match kind {
            BudgetKind::Day => BudgetAnchor::Midnight,
            BudgetKind::Week => BudgetAnchor::Weekday(weekday_number(start.weekday())),
            BudgetKind::Month => BudgetAnchor::DayOfMonth(start.day() as u8),
            BudgetKind::Year => BudgetAnchor::DateOfYear(start),
        }
    }

    pub fn validate_for(&self, kind: BudgetKind) -> Result<()> {
        match (kind, self) {
            (BudgetKind::Day, BudgetAnchor::Midnight) => Ok(()),
            (BudgetKind::Week, BudgetAnchor::Weekday(day)) => weekday_from_number(*day).map(|_| ()),
            (BudgetKind::Month, BudgetAnchor::DayOfMonth(day)) => {
                if (1..=31).contains(day) {
                    Ok(())
                } else {
                    Err(EngineError::InvalidAnchor(format!(
                        "day of month must be within 1..=31, got {day}"
                    )))
                }
            }
            (BudgetKind::Year, BudgetAnchor::DateOfYear(_)) => Ok(()),
            (kind, anchor) => Err(EngineError::InvalidAnchor(format!(
                "{anchor:?} cannot anchor a {kind:?} budget"
            ))),
        }
    }
}

/// What a budget limits: every expense category, or exactly one category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BudgetScope {
    Main,
    Category(Uuid),
}

/// A spending limit repeating every cycle of `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Budget {
    pub id: Uuid,
    pub scope: BudgetScope,
    pub kind: BudgetKind,
    pub anchor: BudgetAnchor,
    /// Date the anchor was derived from, when the budget was created from one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    pub amount: Decimal,
}

impl Budget {
    pub fn new(scope: BudgetScope, kind: BudgetKind, anchor: BudgetAnchor, amount: Decimal) -> Result<Self> {
        anchor.validate_for(kind)?;
        if amount < Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "budget limit must be non-negative, got {amount}"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            scope,
            kind,
            anchor,
            start_date: None,
            amount,
        })
    }

    pub fn starting_on(scope: BudgetScope, kind: BudgetKind, start: NaiveDate, amount: Decimal) -> Result<Self> {
        let mut budget = Self::new(scope, kind, BudgetAnchor::from_start_date(kind, start), amount)?;
        budget.start_date = Some(start);
        Ok(budget)
    }
}
