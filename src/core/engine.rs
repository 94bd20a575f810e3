//! Facade the host app and the CLI call into.

use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::aggregation::{checked_total, AggregationEngine, AmountKind, CashFlowSummary, CategoryShare, TimeFrame};
use crate::core::budget_eval::{BudgetEvaluator, BudgetStatus};
use crate::core::calendar::CalendarPolicy;
use crate::core::materializer::{
    CatchUpCoordinator, CatchUpOutcome, CatchUpTrigger, RecurringMaterializer, DEFAULT_COOLDOWN_SECS,
    DEFAULT_MAX_OCCURRENCES_PER_PASS,
};
use crate::core::period::{CycleWindow, PeriodCalculator};
use crate::core::recurrence::{RecurrenceProjector, UpcomingOccurrence};
use crate::core::time::Clock;
use crate::errors::{EngineError, Result};
use crate::ledger::{
    Budget, BudgetScope, Category, RecurrenceKind, RecurrenceRule, RecurringSchedule, Transaction,
    TransactionDraft,
};
use crate::storage::{LedgerStore, ScheduleQuery, SortOrder, TransactionQuery};

/// Knobs the engine is built with, usually derived from [`crate::config::Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub policy: CalendarPolicy,
    pub cooldown: Duration,
    pub max_occurrences_per_pass: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            policy: CalendarPolicy::default(),
            cooldown: Duration::seconds(DEFAULT_COOLDOWN_SECS),
            max_occurrences_per_pass: DEFAULT_MAX_OCCURRENCES_PER_PASS,
        }
    }
}

/// Bucketed chart data plus the category breakdown for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub frame: TimeFrame,
    pub kind: AmountKind,
    pub window: CycleWindow,
    pub total: Decimal,
    pub buckets: BTreeMap<DateTime<Utc>, Decimal>,
    pub average: Decimal,
    pub maximum: Decimal,
    pub non_zero_buckets: usize,
    pub category_breakdown: Vec<CategoryShare>,
}

pub struct BudgetEngine<S: LedgerStore, C: Clock> {
    store: RwLock<S>,
    clock: C,
    policy: CalendarPolicy,
    periods: PeriodCalculator,
    projector: RecurrenceProjector,
    aggregation: AggregationEngine,
    evaluator: BudgetEvaluator,
    coordinator: CatchUpCoordinator,
}

impl<S: LedgerStore, C: Clock> BudgetEngine<S, C> {
    pub fn new(store: S, clock: C, settings: EngineSettings) -> Self {
        let policy = settings.policy;
        let materializer =
            RecurringMaterializer::new(policy).with_max_per_pass(settings.max_occurrences_per_pass);
        Self {
            store: RwLock::new(store),
            clock,
            policy,
            periods: PeriodCalculator::new(policy),
            projector: RecurrenceProjector::new(policy),
            aggregation: AggregationEngine::new(policy),
            evaluator: BudgetEvaluator,
            coordinator: CatchUpCoordinator::new(materializer, settings.cooldown),
        }
    }

    pub fn policy(&self) -> &CalendarPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn coordinator(&self) -> &CatchUpCoordinator {
        &self.coordinator
    }

    /// Runs `f` against the store under the shared read lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.read())
    }

    pub fn into_store(self) -> S {
        self.store
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Status of one budget in the cycle containing `now`.
    pub fn compute_budget_status(&self, budget_id: Uuid, now: DateTime<Utc>) -> Result<BudgetStatus> {
        let store = self.read();
        let budget = store
            .budget(budget_id)?
            .ok_or(EngineError::BudgetNotFound(budget_id))?;
        self.status_of(&*store, &budget, now)
    }

    pub fn budget_statuses(&self, now: DateTime<Utc>) -> Result<Vec<BudgetStatus>> {
        let store = self.read();
        store
            .budgets()?
            .iter()
            .map(|budget| self.status_of(&*store, budget, now))
            .collect()
    }

    pub fn compute_insights(&self, frame: TimeFrame, kind: AmountKind) -> Result<Insights> {
        self.compute_insights_at(frame, kind, self.now())
    }

    /// Insights for the frame containing `reference`, averaged up to the clock's now.
    pub fn compute_insights_at(&self, frame: TimeFrame, kind: AmountKind, reference: DateTime<Utc>) -> Result<Insights> {
        let now = self.now();
        let window = self.aggregation.frame_window(frame, reference)?;
        let store = self.read();
        let transactions =
            store.fetch_transactions(&TransactionQuery::in_window(&window), SortOrder::OccurredAscending)?;
        let series = self.aggregation.bucket(&transactions, frame, kind, reference, now)?;

        let known: HashSet<Uuid> = store.categories()?.into_iter().map(|c| c.id).collect();
        let breakdown_income = kind == AmountKind::Income;
        let contributing: Vec<Transaction> = transactions
            .into_iter()
            .filter(|txn| txn.is_income == breakdown_income)
            .map(|mut txn| {
                if txn.category_id.map(|id| !known.contains(&id)).unwrap_or(false) {
                    txn.category_id = None;
                }
                txn
            })
            .collect();
        let breakdown_total = checked_total(contributing.iter().map(|txn| txn.amount))?;
        let category_breakdown = self
            .aggregation
            .percent_per_category(&contributing, breakdown_total)?;

        Ok(Insights {
            frame,
            kind,
            window: series.window,
            total: series.total,
            buckets: series.buckets,
            average: series.average,
            maximum: series.maximum,
            non_zero_buckets: series.non_zero_buckets,
            category_breakdown,
        })
    }

    pub fn cash_flow(&self, window: &CycleWindow) -> Result<CashFlowSummary> {
        let transactions = self
            .read()
            .fetch_transactions(&TransactionQuery::in_window(window), SortOrder::default())?;
        self.aggregation.summarize(&transactions, window)
    }

    pub fn upcoming_occurrences(&self, until: DateTime<Utc>) -> Result<Vec<UpcomingOccurrence>> {
        let schedules = self.read().fetch_schedules(&ScheduleQuery::active())?;
        Ok(self.projector.upcoming(&schedules, until))
    }

    /// Materializes due recurring occurrences. Store failures are logged and
    /// reported in the outcome, never returned as errors.
    pub fn run_recurring_catch_up(&self, trigger: CatchUpTrigger, now: DateTime<Utc>) -> CatchUpOutcome {
        self.coordinator.run(&self.store, trigger, now)
    }

    pub fn record_transaction(&self, draft: TransactionDraft, occurred_at: DateTime<Utc>) -> Result<Transaction> {
        let txn = Transaction::new(draft, occurred_at, &self.policy)?;
        self.commit(|store| store.insert_transaction(txn.clone()))?;
        debug!(transaction = %txn.id, "recorded transaction");
        Ok(txn)
    }

    /// Replaces the user-editable fields; a new date recomputes the buckets.
    pub fn update_transaction(
        &self,
        id: Uuid,
        draft: TransactionDraft,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Transaction> {
        let policy = self.policy;
        self.commit(|store| {
            let mut txn = store
                .transaction(id)?
                .ok_or(EngineError::TransactionNotFound(id))?;
            txn.apply_draft(draft)?;
            if let Some(at) = occurred_at {
                txn.set_occurred_at(at, &policy);
            }
            store.update_transaction(txn.clone())?;
            Ok(txn)
        })
    }

    pub fn delete_transaction(&self, id: Uuid) -> Result<()> {
        self.commit(|store| {
            if store.delete_transaction(id)? {
                Ok(())
            } else {
                Err(EngineError::TransactionNotFound(id))
            }
        })
    }

    pub fn add_category(&self, category: Category) -> Result<Category> {
        if category.name.trim().is_empty() {
            return Err(EngineError::Validation("category name cannot be empty".into()));
        }
        self.commit(|store| store.upsert_category(category.clone()))?;
        Ok(category)
    }

    /// Stores a budget. There is one main budget and at most one budget per
    /// category; a second one replaces the first and keeps its id.
    pub fn create_budget(&self, mut budget: Budget) -> Result<Budget> {
        budget.anchor.validate_for(budget.kind)?;
        self.commit(|store| {
            if let BudgetScope::Category(category_id) = budget.scope {
                let exists = store.categories()?.iter().any(|c| c.id == category_id);
                if !exists {
                    return Err(EngineError::CategoryNotFound(category_id));
                }
            }
            if let Some(existing) = store.budgets()?.into_iter().find(|b| b.scope == budget.scope) {
                budget.id = existing.id;
            }
            store.upsert_budget(budget.clone())?;
            Ok(budget)
        })
    }

    /// Creates a schedule whose first occurrence is due at `first_due`.
    /// Monthly rules remember the starting day of month.
    pub fn schedule_recurring(
        &self,
        template: TransactionDraft,
        mut rule: RecurrenceRule,
        first_due: DateTime<Utc>,
    ) -> Result<RecurringSchedule> {
        if rule.kind == RecurrenceKind::Monthly && rule.anchor_day.is_none() {
            rule = rule.anchored_to(self.policy.local_date(first_due).day());
        }
        let schedule = RecurringSchedule::new(template, rule, first_due)?;
        self.commit(|store| store.upsert_schedule(schedule.clone()))?;
        info!(schedule = %schedule.id, rule = %schedule.rule.label(), due = %first_due, "scheduled recurring transaction");
        Ok(schedule)
    }

    /// Stops future occurrences; already materialized transactions stay.
    pub fn cancel_recurring(&self, schedule_id: Uuid) -> Result<RecurringSchedule> {
        self.commit(|store| {
            let mut schedule = store
                .schedule(schedule_id)?
                .ok_or(EngineError::ScheduleNotFound(schedule_id))?;
            schedule.cancel();
            store.upsert_schedule(schedule.clone())?;
            Ok(schedule)
        })
    }

    fn status_of(&self, store: &S, budget: &Budget, now: DateTime<Utc>) -> Result<BudgetStatus> {
        let window = self.periods.cycle_for(budget, now)?;
        let mut query = TransactionQuery::in_window(&window).expenses();
        if let BudgetScope::Category(category_id) = budget.scope {
            query = query.in_category(Some(category_id));
        }
        let transactions = store.fetch_transactions(&query, SortOrder::default())?;
        self.evaluator.evaluate(budget, &window, &transactions, now)
    }

    fn commit<R>(&self, apply: impl FnOnce(&mut S) -> Result<R>) -> Result<R> {
        let mut store = self.write();
        match apply(&mut store).and_then(|value| store.save().map(|_| value)) {
            Ok(value) => Ok(value),
            Err(err) => {
                store.rollback();
                Err(err)
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, S> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::FixedClock;
    use crate::ledger::{BudgetAnchor, BudgetKind};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 16, 12, 0, 0).unwrap()
    }

    fn engine() -> BudgetEngine<MemoryStore, FixedClock> {
        BudgetEngine::new(MemoryStore::new(), FixedClock::new(now()), EngineSettings::default())
    }

    #[test]
    fn budget_status_uses_current_cycle() {
        let engine = engine();
        let budget = engine
            .create_budget(
                Budget::new(BudgetScope::Main, BudgetKind::Month, BudgetAnchor::DayOfMonth(1), dec!(100)).unwrap(),
            )
            .unwrap();
        engine
            .record_transaction(TransactionDraft::expense(dec!(125)), now() - Duration::days(2))
            .unwrap();
        engine
            .record_transaction(TransactionDraft::expense(dec!(40)), now() - Duration::days(30))
            .unwrap();

        let status = engine.compute_budget_status(budget.id, now()).unwrap();
        assert_eq!(status.spent, dec!(125));
        assert_eq!(status.percent_spent, 125.0);
        assert!(status.over_budget);
    }

    #[test]
    fn unknown_budget_is_reported() {
        let missing = Uuid::new_v4();
        assert!(matches!(
            engine().compute_budget_status(missing, now()),
            Err(EngineError::BudgetNotFound(id)) if id == missing
        ));
    }

    #[test]
    fn second_main_budget_replaces_first() {
        let engine = engine();
        let first = engine
            .create_budget(Budget::new(BudgetScope::Main, BudgetKind::Week, BudgetAnchor::Weekday(2), dec!(50)).unwrap())
            .unwrap();
        let second = engine
            .create_budget(Budget::new(BudgetScope::Main, BudgetKind::Week, BudgetAnchor::Weekday(2), dec!(80)).unwrap())
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(engine.with_store(|store| store.budgets().unwrap().len()), 1);
    }

    #[test]
    fn category_budget_requires_category() {
        let missing = Uuid::new_v4();
        let budget =
            Budget::new(BudgetScope::Category(missing), BudgetKind::Day, BudgetAnchor::Midnight, dec!(10)).unwrap();
        assert!(matches!(
            engine().create_budget(budget),
            Err(EngineError::CategoryNotFound(_))
        ));
    }

    #[test]
    fn monthly_schedule_captures_anchor_day() {
        let due = Utc.with_ymd_and_hms(2024, 1, 31, 8, 0, 0).unwrap();
        let schedule = engine()
            .schedule_recurring(TransactionDraft::expense(dec!(9)), RecurrenceRule::monthly(1).unwrap(), due)
            .unwrap();
        assert_eq!(schedule.rule.anchor_day, Some(31));
    }

    #[test]
    fn update_moves_buckets_with_date() {
        let engine = engine();
        let txn = engine
            .record_transaction(TransactionDraft::expense(dec!(5)), now())
            .unwrap();
        let moved_to = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        let updated = engine
            .update_transaction(txn.id, TransactionDraft::expense(dec!(6)), Some(moved_to))
            .unwrap();
        assert_eq!(updated.amount, dec!(6));
        assert_eq!(updated.month_bucket(), Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(updated.day_bucket(), Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap());

        engine.delete_transaction(txn.id).unwrap();
        assert!(matches!(
            engine.delete_transaction(txn.id),
            Err(EngineError::TransactionNotFound(_))
        ));
    }
}
