//! Calendar math, recurrence projection, catch-up and aggregation.

pub mod aggregation;
pub mod budget_eval;
pub mod calendar;
pub mod engine;
pub mod materializer;
pub mod period;
pub mod recurrence;
pub mod time;

pub use aggregation::{AggregationEngine, AmountKind, BucketSeries, CashFlowSummary, CategoryShare, TimeFrame};
pub use budget_eval::{BudgetEvaluator, BudgetStatus};
pub use calendar::CalendarPolicy;
pub use engine::{BudgetEngine, EngineSettings, Insights};
pub use materializer::{
    CatchUpCoordinator, CatchUpFailure, CatchUpOutcome, CatchUpReport, CatchUpTrigger, RecurringMaterializer,
};
pub use period::{CycleWindow, PeriodCalculator};
pub use recurrence::{Occurrences, RecurrenceProjector, UpcomingOccurrence};
pub use time::{Clock, FixedClock, SystemClock};
