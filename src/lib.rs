#![doc(test(attr(deny(warnings))))]

//! Budget Cycles computes budget cycle boundaries, materializes recurring
//! transactions as they come due, and aggregates spending into calendar
//! buckets for insight summaries.

pub mod config;
pub mod core;
pub mod errors;
pub mod ledger;
pub mod storage;
pub mod utils;

pub use crate::core::{BudgetEngine, CalendarPolicy, CatchUpTrigger, EngineSettings};
pub use crate::errors::{EngineError, Result};

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Budget Cycles tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
        super::init();
    }
}
