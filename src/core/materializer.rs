//! Catch-up of recurring schedules whose due dates have passed.

use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::calendar::CalendarPolicy;
use crate::core::recurrence::RecurrenceProjector;
use crate::errors::Result;
use crate::ledger::{OccurrenceKey, RecurringSchedule, Transaction};
use crate::storage::{LedgerStore, ScheduleQuery, SortOrder, TransactionQuery};

pub const DEFAULT_MAX_OCCURRENCES_PER_PASS: usize = 1024;
pub const DEFAULT_COOLDOWN_SECS: i64 = 60;

/// A schedule whose catch-up stopped because a write failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatchUpFailure {
    pub schedule_id: Uuid,
    pub due: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatchUpReport {
    /// Ids of the transactions created during the pass.
    pub materialized: Vec<Uuid>,
    pub schedules_advanced: usize,
    pub failures: Vec<CatchUpFailure>,
    /// The pass hit its occurrence cap; due dates remain for the next trigger.
    pub capped: bool,
}

impl CatchUpReport {
    pub fn created(&self) -> usize {
        self.materialized.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.capped
    }
}

/// Turns due occurrences of recurring schedules into concrete transactions.
#[derive(Debug, Clone, Copy)]
pub struct RecurringMaterializer {
    projector: RecurrenceProjector,
    policy: CalendarPolicy,
    max_per_pass: usize,
}

impl RecurringMaterializer {
    pub fn new(policy: CalendarPolicy) -> Self {
        Self {
            projector: RecurrenceProjector::new(policy),
            policy,
            max_per_pass: DEFAULT_MAX_OCCURRENCES_PER_PASS,
        }
    }

    pub fn with_max_per_pass(mut self, max_per_pass: usize) -> Self {
        self.max_per_pass = max_per_pass.max(1);
        self
    }

    pub fn max_per_pass(&self) -> usize {
        self.max_per_pass
    }

    /// Materializes every occurrence due at or before `now`.
    ///
    /// Each occurrence is two commits: the transaction insert, then the
    /// schedule advance. The insert is skipped when a transaction with the
    /// same occurrence key already exists, so a pass interrupted between the
    /// two commits resumes without duplicating. A failed commit rolls back and
    /// stops that schedule only; the error lands in the report.
    ///
    /// A pass therefore costs `2 * occurrences` saves. On [`crate::storage::JsonFileStore`]
    /// every save rewrites the whole document, so a long backlog is bounded by
    /// `max_per_pass` rather than batched.
    pub fn run<S: LedgerStore + ?Sized>(&self, store: &mut S, now: DateTime<Utc>) -> Result<CatchUpReport> {
        let mut schedules: Vec<RecurringSchedule> = store
            .fetch_schedules(&ScheduleQuery::active())?
            .into_iter()
            .filter(|schedule| schedule.is_due(now))
            .collect();
        schedules.sort_by_key(|schedule| (schedule.next_due, schedule.id));

        let mut report = CatchUpReport::default();
        let mut remaining = self.max_per_pass;
        for schedule in schedules {
            if remaining == 0 {
                report.capped = true;
                break;
            }
            self.catch_up_schedule(store, schedule, now, &mut remaining, &mut report);
        }
        Ok(report)
    }

    fn catch_up_schedule<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        mut schedule: RecurringSchedule,
        now: DateTime<Utc>,
        remaining: &mut usize,
        report: &mut CatchUpReport,
    ) {
        let mut advanced = false;
        while schedule.is_due(now) {
            if *remaining == 0 {
                report.capped = true;
                break;
            }
            let key = OccurrenceKey {
                schedule_id: schedule.id,
                due: schedule.next_due,
            };
            match self.materialize_occurrence(store, &schedule, key) {
                Ok(Some(id)) => report.materialized.push(id),
                Ok(None) => debug!(schedule = %schedule.id, due = %key.due, "occurrence already recorded"),
                Err(err) => {
                    fail(store, report, key, err.to_string());
                    break;
                }
            }

            match self.projector.next_occurrence(schedule.next_due, &schedule.rule) {
                Some(next) => schedule.next_due = next,
                None => {
                    warn!(schedule = %schedule.id, "no further due date; deactivating schedule");
                    schedule.cancel();
                }
            }
            schedule.materialized = schedule.materialized.saturating_add(1);
            let committed = store
                .upsert_schedule(schedule.clone())
                .and_then(|_| store.save());
            if let Err(err) = committed {
                fail(store, report, key, err.to_string());
                break;
            }
            advanced = true;
            *remaining -= 1;
        }
        if advanced {
            report.schedules_advanced += 1;
        }
    }

    fn materialize_occurrence<S: LedgerStore + ?Sized>(
        &self,
        store: &mut S,
        schedule: &RecurringSchedule,
        key: OccurrenceKey,
    ) -> Result<Option<Uuid>> {
        let existing = store.fetch_transactions(&TransactionQuery::with_origin(key), SortOrder::default())?;
        if !existing.is_empty() {
            return Ok(None);
        }
        let txn = Transaction::materialized(&schedule.template, key, &self.policy)?;
        let id = txn.id;
        store.insert_transaction(txn)?;
        store.save()?;
        debug!(schedule = %schedule.id, due = %key.due, transaction = %id, "materialized occurrence");
        Ok(Some(id))
    }
}

fn fail<S: LedgerStore + ?Sized>(store: &mut S, report: &mut CatchUpReport, key: OccurrenceKey, reason: String) {
    store.rollback();
    warn!(schedule = %key.schedule_id, due = %key.due, %reason, "catch-up stopped for schedule");
    report.failures.push(CatchUpFailure {
        schedule_id: key.schedule_id,
        due: key.due,
        reason,
    });
}

/// What asked for a catch-up pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatchUpTrigger {
    /// The app came to the foreground.
    Foreground,
    /// A remote sync finished importing changes.
    SyncCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUpOutcome {
    Completed(CatchUpReport),
    Skipped {
        last_success: DateTime<Utc>,
        retry_after: DateTime<Utc>,
    },
    Failed(String),
}

impl CatchUpOutcome {
    pub fn report(&self) -> Option<&CatchUpReport> {
        match self {
            CatchUpOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    pub fn materialized_count(&self) -> usize {
        self.report().map(CatchUpReport::created).unwrap_or(0)
    }
}

/// Single entry point for catch-up passes.
///
/// Passes are serialized; a pass started within the cool-down of the last
/// complete pass is skipped.
#[derive(Debug)]
pub struct CatchUpCoordinator {
    materializer: RecurringMaterializer,
    cooldown: Duration,
    last_success: Mutex<Option<DateTime<Utc>>>,
}

impl CatchUpCoordinator {
    pub fn new(materializer: RecurringMaterializer, cooldown: Duration) -> Self {
        Self {
            materializer,
            cooldown,
            last_success: Mutex::new(None),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        *self.last_success.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn run<S: LedgerStore>(&self, store: &RwLock<S>, trigger: CatchUpTrigger, now: DateTime<Utc>) -> CatchUpOutcome {
        let mut last_success = self
            .last_success
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(last) = *last_success {
            if now >= last && now - last < self.cooldown {
                debug!(?trigger, %last, "catch-up skipped during cool-down");
                return CatchUpOutcome::Skipped {
                    last_success: last,
                    retry_after: last + self.cooldown,
                };
            }
        }

        let mut guard = store.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        match self.materializer.run(&mut *guard, now) {
            Ok(report) => {
                info!(
                    ?trigger,
                    created = report.created(),
                    schedules = report.schedules_advanced,
                    failures = report.failures.len(),
                    capped = report.capped,
                    "recurring catch-up finished"
                );
                if report.is_complete() {
                    *last_success = Some(now);
                }
                CatchUpOutcome::Completed(report)
            }
            Err(err) => {
                warn!(?trigger, error = %err, "recurring catch-up failed");
                CatchUpOutcome::Failed(err.to_string())
            }
        }
    }
}
