//! Bucketed spend/income/net series for insight charts and summaries.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::calendar::CalendarPolicy;
use crate::core::period::CycleWindow;
use crate::errors::{EngineError, Result};
use crate::ledger::time_interval::{clamp_ymd, shift_month};
use crate::ledger::Transaction;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimeFrame {
    /// Seven day buckets starting on the configured first weekday.
    Week,
    /// One day bucket per day of the billing month.
    Month,
    /// Twelve calendar-month buckets.
    Year,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AmountKind {
    #[default]
    Expense,
    Income,
    /// Income positive, expenses negative.
    Net,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSeries {
    pub window: CycleWindow,
    pub buckets: BTreeMap<DateTime<Utc>, Decimal>,
    pub total: Decimal,
    pub maximum: Decimal,
    pub non_zero_buckets: usize,
    /// `total / (elapsed + 1)` where `elapsed` counts whole buckets since the
    /// window start.
    pub average: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    /// `None` for uncategorised amounts.
    pub category_id: Option<Uuid>,
    pub amount: Decimal,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CashFlowSummary {
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Copy)]
pub struct AggregationEngine {
    policy: CalendarPolicy,
}

impl AggregationEngine {
    pub fn new(policy: CalendarPolicy) -> Self {
        Self { policy }
    }

    /// Window of the frame containing `reference`.
    pub fn frame_window(&self, frame: TimeFrame, reference: DateTime<Utc>) -> Result<CycleWindow> {
        let start = match frame {
            TimeFrame::Week => self.policy.start_of_week(reference),
            TimeFrame::Month => self.policy.start_of_month(reference),
            TimeFrame::Year => self.policy.start_of_year(reference),
        };
        let start_date = self.policy.local_date(start);
        let end_date = match frame {
            TimeFrame::Week => start_date.checked_add_signed(Duration::days(7)),
            TimeFrame::Month => shift_month(start_date, 1).and_then(|next| {
                clamp_ymd(next.year(), next.month(), self.policy.first_day_of_month() as u32)
            }),
            TimeFrame::Year => NaiveDate::from_ymd_opt(start_date.year() + 1, 1, 1),
        }
        .ok_or_else(|| EngineError::OutOfRange(format!("no {frame:?} frame after {start_date}")))?;
        Ok(CycleWindow {
            start,
            end: self.policy.midnight(end_date),
        })
    }

    /// Groups transactions in the frame around `reference` into pre-filled buckets.
    pub fn bucket(
        &self,
        transactions: &[Transaction],
        frame: TimeFrame,
        kind: AmountKind,
        reference: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<BucketSeries> {
        let window = self.frame_window(frame, reference)?;
        let mut buckets: BTreeMap<DateTime<Utc>, Decimal> = self
            .bucket_starts(frame, &window)
            .into_iter()
            .map(|start| (start, Decimal::ZERO))
            .collect();

        let mut total = Decimal::ZERO;
        for txn in transactions.iter().filter(|txn| window.contains(txn.occurred_at())) {
            let Some(value) = amount_for(txn, kind) else {
                continue;
            };
            let key = self.bucket_key(txn, frame, &buckets);
            let slot = buckets.entry(key).or_insert(Decimal::ZERO);
            *slot = add_amounts(*slot, value)?;
            total = add_amounts(total, value)?;
        }

        let maximum = buckets.values().copied().max().unwrap_or(Decimal::ZERO);
        let non_zero_buckets = buckets.values().filter(|value| !value.is_zero()).count();
        let elapsed = self.elapsed_buckets(frame, &window, now, buckets.len());
        let average = total / Decimal::from(elapsed + 1);

        Ok(BucketSeries {
            window,
            buckets,
            total,
            maximum,
            non_zero_buckets,
            average,
        })
    }

    /// Share of `total` per category, largest first. Zero contributions and a
    /// zero total yield nothing.
    pub fn percent_per_category(&self, transactions: &[Transaction], total: Decimal) -> Result<Vec<CategoryShare>> {
        if total.is_zero() {
            return Ok(Vec::new());
        }
        let mut sums: HashMap<Option<Uuid>, Decimal> = HashMap::new();
        for txn in transactions {
            let sum = sums.entry(txn.category_id).or_insert(Decimal::ZERO);
            *sum = add_amounts(*sum, txn.amount)?;
        }
        let mut shares: Vec<CategoryShare> = sums
            .into_iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(category_id, amount)| CategoryShare {
                category_id,
                amount,
                percent: amount
                    .checked_div(total)
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                    .and_then(|percent| percent.to_f64())
                    .unwrap_or(0.0),
            })
            .collect();
        shares.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.category_id.cmp(&b.category_id)));
        Ok(shares)
    }

    pub fn summarize(&self, transactions: &[Transaction], window: &CycleWindow) -> Result<CashFlowSummary> {
        let mut summary = CashFlowSummary::default();
        for txn in transactions.iter().filter(|txn| window.contains(txn.occurred_at())) {
            if txn.is_income {
                summary.income = add_amounts(summary.income, txn.amount)?;
            } else {
                summary.expense = add_amounts(summary.expense, txn.amount)?;
            }
        }
        // Both sides are non-negative, so the difference stays in range.
        summary.net = summary.income - summary.expense;
        Ok(summary)
    }

    fn bucket_starts(&self, frame: TimeFrame, window: &CycleWindow) -> Vec<DateTime<Utc>> {
        let first = self.policy.local_date(window.start);
        let last = self.policy.local_date(window.end);
        let mut starts = Vec::new();
        let mut cursor = Some(first);
        while let Some(date) = cursor.filter(|date| *date < last) {
            starts.push(self.policy.midnight(date));
            cursor = match frame {
                TimeFrame::Week | TimeFrame::Month => date.succ_opt(),
                TimeFrame::Year => shift_month(date, 1),
            };
        }
        starts
    }

    fn bucket_key(
        &self,
        txn: &Transaction,
        frame: TimeFrame,
        buckets: &BTreeMap<DateTime<Utc>, Decimal>,
    ) -> DateTime<Utc> {
        let stored = match frame {
            TimeFrame::Week | TimeFrame::Month => txn.day_bucket(),
            TimeFrame::Year => txn.month_bucket(),
        };
        if buckets.contains_key(&stored) {
            return stored;
        }
        // Stored keys go stale when the calendar offset changes.
        match frame {
            TimeFrame::Week | TimeFrame::Month => self.policy.start_of_day(txn.occurred_at()),
            TimeFrame::Year => self.policy.start_of_calendar_month(txn.occurred_at()),
        }
    }

    fn elapsed_buckets(&self, frame: TimeFrame, window: &CycleWindow, now: DateTime<Utc>, count: usize) -> usize {
        if now < window.start || count == 0 {
            return 0;
        }
        let start = self.policy.local_date(window.start);
        let today = self.policy.local_date(now);
        let elapsed = match frame {
            TimeFrame::Week | TimeFrame::Month => (today - start).num_days(),
            TimeFrame::Year => {
                (today.year() - start.year()) as i64 * 12 + today.month() as i64 - start.month() as i64
            }
        };
        (elapsed.max(0) as usize).min(count - 1)
    }
}

fn add_amounts(sum: Decimal, amount: Decimal) -> Result<Decimal> {
    sum.checked_add(amount)
        .ok_or_else(|| EngineError::OutOfRange(format!("sum exceeds the representable amount range after adding {amount}")))
}

/// Overflow-checked sum of amounts.
pub(crate) fn checked_total(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal> {
    amounts.into_iter().try_fold(Decimal::ZERO, add_amounts)
}

fn amount_for(txn: &Transaction, kind: AmountKind) -> Option<Decimal> {
    match kind {
        AmountKind::Expense if txn.is_expense() => Some(txn.amount),
        AmountKind::Income if txn.is_income => Some(txn.amount),
        AmountKind::Net => Some(txn.signed_amount()),
        _ => None,
    }
}
