//! Ledger domain models: transactions, categories, budgets and recurring schedules.

pub mod budget;
pub mod category;
pub mod recurring;
pub mod time_interval;
pub mod transaction;

pub use budget::{Budget, BudgetAnchor, BudgetKind, BudgetScope};
pub use category::Category;
pub use recurring::{RecurrenceKind, RecurrenceRule, RecurringSchedule};
pub use time_interval::{TimeInterval, TimeUnit};
pub use transaction::{OccurrenceKey, Transaction, TransactionDraft};
