#![allow(dead_code)]

use budget_cycles::{
    core::{BudgetEngine, EngineSettings, FixedClock},
    storage::{JsonFileStore, MemoryStore},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

/// Engine over an empty in-memory store with the clock frozen at `now`.
pub fn memory_engine(now: DateTime<Utc>) -> BudgetEngine<MemoryStore, FixedClock> {
    BudgetEngine::new(MemoryStore::new(), FixedClock::new(now), EngineSettings::default())
}

pub fn engine_with(store: MemoryStore, now: DateTime<Utc>) -> BudgetEngine<MemoryStore, FixedClock> {
    BudgetEngine::new(store, FixedClock::new(now), EngineSettings::default())
}

/// Same as [`engine_with`] but without a catch-up cool-down.
pub fn eager_engine(store: MemoryStore, now: DateTime<Utc>) -> BudgetEngine<MemoryStore, FixedClock> {
    let settings = EngineSettings {
        cooldown: Duration::zero(),
        ..EngineSettings::default()
    };
    BudgetEngine::new(store, FixedClock::new(now), settings)
}

/// Engine over a JSON store in a fresh temp dir. Keep the `TempDir` alive.
pub fn json_engine(now: DateTime<Utc>) -> (BudgetEngine<JsonFileStore, FixedClock>, TempDir) {
    let temp = TempDir::new().expect("create temp dir");
    let store = JsonFileStore::open(temp.path().join("ledger.json")).expect("open json store");
    let engine = BudgetEngine::new(store, FixedClock::new(now), EngineSettings::default());
    (engine, temp)
}
