use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{LedgerSnapshot, LedgerStore, MemoryStore, ScheduleQuery, SortOrder, TransactionQuery};
use crate::errors::{EngineError, Result};
use crate::ledger::{Budget, Category, RecurringSchedule, Transaction};
use crate::utils::write_atomic;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredLedger {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    #[serde(default)]
    ledger: LedgerSnapshot,
}

/// Ledger store persisted as a single JSON document.
///
/// Staged writes live in memory; `save` rewrites the file through a temporary
/// file and a rename, so a crash leaves either the old or the new document.
/// Each save costs a full serialization plus an fsync, proportional to the
/// ledger size.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            load_snapshot(&path)?
        } else {
            LedgerSnapshot::default()
        };
        debug!(
            path = %path.display(),
            transactions = snapshot.transactions.len(),
            schedules = snapshot.schedules.len(),
            "opened json ledger store"
        );
        Ok(Self {
            path,
            inner: MemoryStore::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &LedgerSnapshot {
        self.inner.committed()
    }
}

pub fn load_snapshot(path: &Path) -> Result<LedgerSnapshot> {
    let data = fs::read_to_string(path)
        .map_err(|err| EngineError::StoreReadFailed(format!("{}: {err}", path.display())))?;
    let stored: StoredLedger = serde_json::from_str(&data)
        .map_err(|err| EngineError::StoreReadFailed(format!("{}: {err}", path.display())))?;
    if stored.schema_version > CURRENT_SCHEMA_VERSION {
        return Err(EngineError::StoreReadFailed(format!(
            "ledger `{}` is from a newer schema version ({})",
            path.display(),
            stored.schema_version
        )));
    }
    Ok(stored.ledger)
}

impl LedgerStore for JsonFileStore {
    fn fetch_transactions(&self, query: &TransactionQuery, sort: SortOrder) -> Result<Vec<Transaction>> {
        self.inner.fetch_transactions(query, sort)
    }

    fn fetch_schedules(&self, query: &ScheduleQuery) -> Result<Vec<RecurringSchedule>> {
        self.inner.fetch_schedules(query)
    }

    fn categories(&self) -> Result<Vec<Category>> {
        self.inner.categories()
    }

    fn budgets(&self) -> Result<Vec<Budget>> {
        self.inner.budgets()
    }

    fn insert_transaction(&mut self, txn: Transaction) -> Result<()> {
        self.inner.insert_transaction(txn)
    }

    fn update_transaction(&mut self, txn: Transaction) -> Result<()> {
        self.inner.update_transaction(txn)
    }

    fn delete_transaction(&mut self, id: Uuid) -> Result<bool> {
        self.inner.delete_transaction(id)
    }

    fn upsert_schedule(&mut self, schedule: RecurringSchedule) -> Result<()> {
        self.inner.upsert_schedule(schedule)
    }

    fn upsert_category(&mut self, category: Category) -> Result<()> {
        self.inner.upsert_category(category)
    }

    fn upsert_budget(&mut self, budget: Budget) -> Result<()> {
        self.inner.upsert_budget(budget)
    }

    fn save(&mut self) -> Result<()> {
        if !self.inner.has_pending_changes() && self.path.exists() {
            return Ok(());
        }
        let stored = StoredLedger {
            schema_version: CURRENT_SCHEMA_VERSION,
            saved_at: Utc::now(),
            ledger: self.inner.working().clone(),
        };
        let json = serde_json::to_string_pretty(&stored)?;
        write_atomic(&self.path, &json)
            .map_err(|err| EngineError::StoreWriteFailed(format!("{}: {err}", self.path.display())))?;
        self.inner.commit();
        Ok(())
    }

    fn rollback(&mut self) {
        self.inner.rollback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::CalendarPolicy;
    use crate::ledger::TransactionDraft;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn store_in_temp_dir() -> (JsonFileStore, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        let store = JsonFileStore::open(temp.path().join("ledger.json")).expect("open store");
        (store, temp)
    }

    fn sample() -> Transaction {
        Transaction::new(TransactionDraft::expense(dec!(3.50)), Utc::now(), &CalendarPolicy::default())
            .expect("transaction")
    }

    #[test]
    fn save_and_reopen_roundtrip() {
        let (mut store, guard) = store_in_temp_dir();
        let txn = sample();
        store.insert_transaction(txn.clone()).expect("insert");
        store.save().expect("save");

        let reopened = JsonFileStore::open(guard.path().join("ledger.json")).expect("reopen");
        assert_eq!(reopened.snapshot().transactions, vec![txn]);
    }

    #[test]
    fn rollback_leaves_file_untouched() {
        let (mut store, guard) = store_in_temp_dir();
        store.insert_transaction(sample()).expect("insert");
        store.rollback();
        store.save().expect("save");
        let reopened = JsonFileStore::open(guard.path().join("ledger.json")).expect("reopen");
        assert!(reopened.snapshot().transactions.is_empty());
    }

    #[test]
    fn newer_schema_is_rejected() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("ledger.json");
        fs::write(
            &path,
            r#"{ "schema_version": 99, "saved_at": "2024-01-01T00:00:00Z", "ledger": {} }"#,
        )
        .expect("write");
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(EngineError::StoreReadFailed(_))
        ));
    }

    #[test]
    fn corrupted_file_is_a_read_failure() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("ledger.json");
        fs::write(&path, "{ truncated").expect("write");
        let err = JsonFileStore::open(&path).expect_err("corrupted file must fail");
        assert!(err.is_store_failure());
    }
}
