use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::calendar::CalendarPolicy;
use crate::errors::{EngineError, Result};

/// User-supplied fields of a transaction, also used as the template of a recurring schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionDraft {
    pub amount: Decimal,
    pub is_income: bool,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransactionDraft {
    pub fn expense(amount: Decimal) -> Self {
        Self {
            amount,
            is_income: false,
            category_id: None,
            note: None,
        }
    }

    pub fn income(amount: Decimal) -> Self {
        Self {
            is_income: true,
            ..Self::expense(amount)
        }
    }

    pub fn in_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount < Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "transaction amount must be non-negative, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Identifies one scheduled occurrence of a recurring schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OccurrenceKey {
    pub schedule_id: Uuid,
    pub due: DateTime<Utc>,
}

/// A concrete ledger entry.
///
/// `day_bucket` and `month_bucket` are denormalised grouping keys; they only
/// change together with `occurred_at` through [`Transaction::set_occurred_at`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: Uuid,
    pub amount: Decimal,
    pub is_income: bool,
    occurred_at: DateTime<Utc>,
    day_bucket: DateTime<Utc>,
    month_bucket: DateTime<Utc>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<OccurrenceKey>,
}

impl Transaction {
    pub fn new(draft: TransactionDraft, occurred_at: DateTime<Utc>, policy: &CalendarPolicy) -> Result<Self> {
        draft.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            amount: draft.amount,
            is_income: draft.is_income,
            occurred_at,
            day_bucket: policy.start_of_day(occurred_at),
            month_bucket: policy.start_of_calendar_month(occurred_at),
            category_id: draft.category_id,
            note: draft.note,
            origin: None,
        })
    }

    /// Historical record of a recurring occurrence; carries no recurrence of its own.
    pub fn materialized(
        template: &TransactionDraft,
        key: OccurrenceKey,
        policy: &CalendarPolicy,
    ) -> Result<Self> {
        let mut txn = Self::new(template.clone(), key.due, policy)?;
        txn.origin = Some(key);
        Ok(txn)
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn day_bucket(&self) -> DateTime<Utc> {
        self.day_bucket
    }

    pub fn month_bucket(&self) -> DateTime<Utc> {
        self.month_bucket
    }

    pub fn set_occurred_at(&mut self, occurred_at: DateTime<Utc>, policy: &CalendarPolicy) {
        self.occurred_at = occurred_at;
        self.refresh_buckets(policy);
    }

    /// Recomputes the grouping keys, e.g. after the calendar offset changed.
    pub fn refresh_buckets(&mut self, policy: &CalendarPolicy) {
        self.day_bucket = policy.start_of_day(self.occurred_at);
        self.month_bucket = policy.start_of_calendar_month(self.occurred_at);
    }

    /// Income counts positive, expenses negative.
    pub fn signed_amount(&self) -> Decimal {
        if self.is_income {
            self.amount
        } else {
            -self.amount
        }
    }

    pub fn is_expense(&self) -> bool {
        !self.is_income
    }

    pub fn apply_draft(&mut self, draft: TransactionDraft) -> Result<()> {
        draft.validate()?;
        self.amount = draft.amount;
        self.is_income = draft.is_income;
        self.category_id = draft.category_id;
        self.note = draft.note;
        Ok(())
    }
}
