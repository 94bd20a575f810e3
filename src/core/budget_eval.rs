use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::core::aggregation::checked_total;
use crate::core::period::{CycleWindow, PeriodCalculator};
use crate::errors::Result;
use crate::ledger::{Budget, BudgetScope, Transaction};

/// Spending position of one budget within one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    pub budget_id: Uuid,
    pub window: CycleWindow,
    pub spent: Decimal,
    pub limit: Decimal,
    /// Negative once the limit is exceeded.
    pub remaining: Decimal,
    /// Fraction of the cycle elapsed, `0.0..=1.0`.
    pub percent_elapsed: f64,
    /// Percentage of the limit spent; 125.0 means 25 % over. Unclamped.
    pub percent_spent: f64,
    pub over_budget: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetEvaluator;

impl BudgetEvaluator {
    /// Sums the expenses in `window` that fall under the budget's scope.
    /// Fails only when the sum leaves the `Decimal` range.
    pub fn evaluate(
        &self,
        budget: &Budget,
        window: &CycleWindow,
        transactions: &[Transaction],
        now: DateTime<Utc>,
    ) -> Result<BudgetStatus> {
        let spent = checked_total(
            transactions
                .iter()
                .filter(|txn| txn.is_expense() && window.contains(txn.occurred_at()))
                .filter(|txn| match budget.scope {
                    BudgetScope::Main => true,
                    BudgetScope::Category(id) => txn.category_id == Some(id),
                })
                .map(|txn| txn.amount),
        )?;
        let limit = budget.amount;

        Ok(BudgetStatus {
            budget_id: budget.id,
            window: *window,
            spent,
            limit,
            remaining: limit - spent,
            percent_elapsed: PeriodCalculator::percent_elapsed(window, now),
            percent_spent: percent_of(spent, limit),
            over_budget: spent > limit,
        })
    }
}

fn percent_of(spent: Decimal, limit: Decimal) -> f64 {
    if limit.is_zero() {
        return if spent.is_zero() { 0.0 } else { f64::INFINITY };
    }
    spent
        .checked_div(limit)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|percent| percent.to_f64())
        .unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::CalendarPolicy;
    use crate::ledger::{BudgetAnchor, BudgetKind, TransactionDraft};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, d, h, 0, 0).unwrap()
    }

    fn window() -> CycleWindow {
        CycleWindow {
            start: at(1, 0),
            end: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    fn spend(amount: Decimal, draft_category: Option<Uuid>, when: DateTime<Utc>) -> Transaction {
        let mut draft = TransactionDraft::expense(amount);
        draft.category_id = draft_category;
        Transaction::new(draft, when, &CalendarPolicy::default()).unwrap()
    }

    #[test]
    fn overspent_budget_reports_unclamped_percentage() {
        let budget = Budget::new(BudgetScope::Main, BudgetKind::Month, BudgetAnchor::DayOfMonth(1), dec!(100)).unwrap();
        let txns = vec![spend(dec!(100), None, at(3, 9)), spend(dec!(25), None, at(20, 9))];
        let status = BudgetEvaluator.evaluate(&budget, &window(), &txns, at(16, 0)).unwrap();
        assert_eq!(status.spent, dec!(125));
        assert_eq!(status.percent_spent, 125.0);
        assert_eq!(status.remaining, dec!(-25));
        assert!(status.over_budget);
        assert_eq!(status.percent_elapsed, 0.5);
    }

    #[test]
    fn zero_limit_does_not_divide() {
        let budget = Budget::new(BudgetScope::Main, BudgetKind::Month, BudgetAnchor::DayOfMonth(1), dec!(0)).unwrap();
        let idle = BudgetEvaluator.evaluate(&budget, &window(), &[], at(2, 0)).unwrap();
        assert_eq!(idle.percent_spent, 0.0);
        assert!(!idle.over_budget);

        let txns = vec![spend(dec!(1), None, at(2, 1))];
        let spent = BudgetEvaluator.evaluate(&budget, &window(), &txns, at(2, 2)).unwrap();
        assert!(spent.percent_spent.is_infinite());
        assert!(spent.over_budget);
    }

    #[test]
    fn category_budget_ignores_other_categories_and_income() {
        let groceries = Uuid::new_v4();
        let budget = Budget::new(
            BudgetScope::Category(groceries),
            BudgetKind::Month,
            BudgetAnchor::DayOfMonth(1),
            dec!(200),
        )
        .unwrap();
        let refund = Transaction::new(
            TransactionDraft::income(dec!(40)).in_category(groceries),
            at(5, 0),
            &CalendarPolicy::default(),
        )
        .unwrap();
        let txns = vec![
            spend(dec!(50), Some(groceries), at(4, 12)),
            spend(dec!(80), Some(Uuid::new_v4()), at(4, 12)),
            spend(dec!(10), None, at(6, 12)),
            refund,
        ];
        let status = BudgetEvaluator.evaluate(&budget, &window(), &txns, at(10, 0)).unwrap();
        assert_eq!(status.spent, dec!(50));
        assert_eq!(status.percent_spent, 25.0);
        assert!(!status.over_budget);
    }

    #[test]
    fn huge_amounts_saturate_instead_of_panicking() {
        let budget = Budget::new(BudgetScope::Main, BudgetKind::Month, BudgetAnchor::DayOfMonth(1), dec!(0.01)).unwrap();
        let txns = vec![spend(Decimal::MAX / dec!(2), None, at(3, 9))];
        let status = BudgetEvaluator.evaluate(&budget, &window(), &txns, at(4, 0)).unwrap();
        assert!(status.percent_spent.is_infinite());
        assert!(status.over_budget);

        let overflowing = vec![spend(Decimal::MAX, None, at(3, 9)), spend(Decimal::MAX, None, at(5, 9))];
        let result = BudgetEvaluator.evaluate(&budget, &window(), &overflowing, at(6, 0));
        assert!(matches!(result, Err(crate::errors::EngineError::OutOfRange(_))));
    }
}
