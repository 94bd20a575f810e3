//! Persistence collaborator consumed by the engine, plus the bundled backends.

pub mod json_backend;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::period::CycleWindow;
use crate::errors::Result;
use crate::ledger::{Budget, Category, OccurrenceKey, RecurringSchedule, Transaction};

pub use json_backend::JsonFileStore;
pub use memory::MemoryStore;

/// Predicate over stored transactions. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// `Some(None)` matches uncategorised transactions only.
    pub category: Option<Option<Uuid>>,
    pub is_income: Option<bool>,
    pub origin: Option<OccurrenceKey>,
}

impl TransactionQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_window(window: &CycleWindow) -> Self {
        Self {
            from: Some(window.start),
            until: Some(window.end),
            ..Self::default()
        }
    }

    pub fn in_category(mut self, category_id: Option<Uuid>) -> Self {
        self.category = Some(category_id);
        self
    }

    pub fn expenses(mut self) -> Self {
        self.is_income = Some(false);
        self
    }

    pub fn income(mut self) -> Self {
        self.is_income = Some(true);
        self
    }

    pub fn with_origin(key: OccurrenceKey) -> Self {
        Self {
            origin: Some(key),
            ..Self::default()
        }
    }

    pub fn matches(&self, txn: &Transaction) -> bool {
        let at = txn.occurred_at();
        if self.from.map(|from| at < from).unwrap_or(false) {
            return false;
        }
        if self.until.map(|until| at >= until).unwrap_or(false) {
            return false;
        }
        if let Some(category) = self.category {
            if txn.category_id != category {
                return false;
            }
        }
        if let Some(is_income) = self.is_income {
            if txn.is_income != is_income {
                return false;
            }
        }
        if let Some(origin) = self.origin {
            if txn.origin != Some(origin) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    OccurredAscending,
    OccurredDescending,
}

impl SortOrder {
    pub fn apply(&self, transactions: &mut [Transaction]) {
        match self {
            SortOrder::OccurredAscending => {
                transactions.sort_by_key(|txn| (txn.occurred_at(), txn.id))
            }
            SortOrder::OccurredDescending => transactions
                .sort_by_key(|txn| std::cmp::Reverse((txn.occurred_at(), txn.id))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleQuery {
    pub active_only: bool,
}

impl ScheduleQuery {
    pub fn active() -> Self {
        Self { active_only: true }
    }

    pub fn matches(&self, schedule: &RecurringSchedule) -> bool {
        !self.active_only || schedule.is_active()
    }
}

/// Everything a store holds, in a serialisable form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub schedules: Vec<RecurringSchedule>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
}

/// Read/write store the engine runs against.
///
/// Writes are staged until [`LedgerStore::save`] commits them; reads observe
/// staged writes, like an object-graph context would.
pub trait LedgerStore: Send + Sync {
    fn fetch_transactions(&self, query: &TransactionQuery, sort: SortOrder) -> Result<Vec<Transaction>>;
    fn fetch_schedules(&self, query: &ScheduleQuery) -> Result<Vec<RecurringSchedule>>;
    fn categories(&self) -> Result<Vec<Category>>;
    fn budgets(&self) -> Result<Vec<Budget>>;

    fn insert_transaction(&mut self, txn: Transaction) -> Result<()>;
    fn update_transaction(&mut self, txn: Transaction) -> Result<()>;
    fn delete_transaction(&mut self, id: Uuid) -> Result<bool>;
    fn upsert_schedule(&mut self, schedule: RecurringSchedule) -> Result<()>;
    fn upsert_category(&mut self, category: Category) -> Result<()>;
    fn upsert_budget(&mut self, budget: Budget) -> Result<()>;

    /// Commits staged writes.
    fn save(&mut self) -> Result<()>;
    /// Discards staged writes.
    fn rollback(&mut self);

    fn budget(&self, id: Uuid) -> Result<Option<Budget>> {
        Ok(self.budgets()?.into_iter().find(|budget| budget.id == id))
    }

    fn schedule(&self, id: Uuid) -> Result<Option<RecurringSchedule>> {
        Ok(self
            .fetch_schedules(&ScheduleQuery::default())?
            .into_iter()
            .find(|schedule| schedule.id == id))
    }

    fn transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self
            .fetch_transactions(&TransactionQuery::all(), SortOrder::default())?
            .into_iter()
            .find(|txn| txn.id == id))
    }
}
