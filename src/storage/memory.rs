use uuid::Uuid;

use super::{LedgerSnapshot, LedgerStore, ScheduleQuery, SortOrder, TransactionQuery};
use crate::errors::{EngineError, Result};
use crate::ledger::{Budget, Category, RecurringSchedule, Transaction};

/// In-memory store with a committed snapshot and a working copy.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: LedgerSnapshot,
    working: LedgerSnapshot,
    saves_before_failure: Option<usize>,
    save_count: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            committed: snapshot.clone(),
            working: snapshot,
            ..Self::default()
        }
    }

    pub fn committed(&self) -> &LedgerSnapshot {
        &self.committed
    }

    pub fn working(&self) -> &LedgerSnapshot {
        &self.working
    }

    pub fn has_pending_changes(&self) -> bool {
        self.committed != self.working
    }

    /// Lets `successful` more saves through, then fails every save after that.
    pub fn fail_saves_after(&mut self, successful: usize) {
        self.saves_before_failure = Some(successful);
    }

    pub fn clear_save_failures(&mut self) {
        self.saves_before_failure = None;
    }

    pub fn save_count(&self) -> usize {
        self.save_count
    }

    pub(crate) fn check_save_allowed(&mut self) -> Result<()> {
        if let Some(remaining) = self.saves_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(EngineError::StoreWriteFailed(
                    "store rejected the save".into(),
                ));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    pub(crate) fn commit(&mut self) {
        self.committed = self.working.clone();
        self.save_count += 1;
    }
}

impl LedgerStore for MemoryStore {
    fn fetch_transactions(&self, query: &TransactionQuery, sort: SortOrder) -> Result<Vec<Transaction>> {
        let mut found: Vec<Transaction> = self
            .working
            .transactions
            .iter()
            .filter(|txn| query.matches(txn))
            .cloned()
            .collect();
        sort.apply(&mut found);
        Ok(found)
    }

    fn fetch_schedules(&self, query: &ScheduleQuery) -> Result<Vec<RecurringSchedule>> {
        Ok(self
            .working
            .schedules
            .iter()
            .filter(|schedule| query.matches(schedule))
            .cloned()
            .collect())
    }

    fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.working.categories.clone())
    }

    fn budgets(&self) -> Result<Vec<Budget>> {
        Ok(self.working.budgets.clone())
    }

    fn insert_transaction(&mut self, txn: Transaction) -> Result<()> {
        if self.working.transactions.iter().any(|existing| existing.id == txn.id) {
            return Err(EngineError::Validation(format!(
                "transaction {} already exists",
                txn.id
            )));
        }
        self.working.transactions.push(txn);
        Ok(())
    }

    fn update_transaction(&mut self, txn: Transaction) -> Result<()> {
        let slot = self
            .working
            .transactions
            .iter_mut()
            .find(|existing| existing.id == txn.id)
            .ok_or(EngineError::TransactionNotFound(txn.id))?;
        *slot = txn;
        Ok(())
    }

    fn delete_transaction(&mut self, id: Uuid) -> Result<bool> {
        let before = self.working.transactions.len();
        self.working.transactions.retain(|txn| txn.id != id);
        Ok(self.working.transactions.len() != before)
    }

    fn upsert_schedule(&mut self, schedule: RecurringSchedule) -> Result<()> {
        upsert(&mut self.working.schedules, schedule, |s| s.id);
        Ok(())
    }

    fn upsert_category(&mut self, category: Category) -> Result<()> {
        upsert(&mut self.working.categories, category, |c| c.id);
        Ok(())
    }

    fn upsert_budget(&mut self, budget: Budget) -> Result<()> {
        upsert(&mut self.working.budgets, budget, |b| b.id);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.check_save_allowed()?;
        self.commit();
        Ok(())
    }

    fn rollback(&mut self) {
        self.working = self.committed.clone();
    }
}

fn upsert<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> Uuid) {
    let key = id(&item);
    match items.iter_mut().find(|existing| id(existing) == key) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::CalendarPolicy;
    use crate::ledger::TransactionDraft;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn sample(day: u32) -> Transaction {
        let at = Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap();
        Transaction::new(TransactionDraft::expense(dec!(10)), at, &CalendarPolicy::default()).unwrap()
    }

    #[test]
    fn rollback_discards_staged_writes() {
        let mut store = MemoryStore::new();
        store.insert_transaction(sample(1)).unwrap();
        store.save().unwrap();
        store.insert_transaction(sample(2)).unwrap();
        assert!(store.has_pending_changes());
        store.rollback();
        assert_eq!(store.working().transactions.len(), 1);
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn injected_failure_keeps_committed_state() {
        let mut store = MemoryStore::new();
        store.fail_saves_after(1);
        store.insert_transaction(sample(1)).unwrap();
        store.save().unwrap();
        store.insert_transaction(sample(2)).unwrap();
        assert!(matches!(store.save(), Err(EngineError::StoreWriteFailed(_))));
        assert_eq!(store.committed().transactions.len(), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn fetch_filters_and_sorts() {
        let mut store = MemoryStore::new();
        let late = sample(20);
        let early = sample(3);
        store.insert_transaction(late.clone()).unwrap();
        store.insert_transaction(early.clone()).unwrap();
        let query = TransactionQuery {
            from: Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2024, 4, 21, 0, 0, 0).unwrap()),
            ..TransactionQuery::default()
        };
        let ascending = store.fetch_transactions(&query, SortOrder::OccurredAscending).unwrap();
        assert_eq!(ascending.iter().map(|t| t.id).collect::<Vec<_>>(), vec![early.id, late.id]);
        let descending = store.fetch_transactions(&query, SortOrder::OccurredDescending).unwrap();
        assert_eq!(descending[0].id, late.id);

        let narrow = TransactionQuery {
            until: Some(Utc.with_ymd_and_hms(2024, 4, 20, 10, 0, 0).unwrap()),
            ..query
        };
        assert_eq!(store.fetch_transactions(&narrow, SortOrder::default()).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut store = MemoryStore::new();
        let txn = sample(5);
        store.insert_transaction(txn.clone()).unwrap();
        assert!(matches!(store.insert_transaction(txn), Err(EngineError::Validation(_))));
    }
}
