use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::calendar::{CalendarPolicy, DEFAULT_FIRST_DAY_OF_MONTH, DEFAULT_FIRST_WEEKDAY};
use crate::core::engine::EngineSettings;
use crate::core::materializer::{DEFAULT_COOLDOWN_SECS, DEFAULT_MAX_OCCURRENCES_PER_PASS};
use crate::errors::{EngineError, Result};
use crate::utils::{app_data_dir, config_file_in, ensure_dir, store_file_in, write_atomic};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CalendarSettings {
    /// 1..=7, Sunday = 1.
    pub first_weekday: u8,
    /// 1..=28.
    pub first_day_of_month: u8,
    pub utc_offset_minutes: i32,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        Self {
            first_weekday: DEFAULT_FIRST_WEEKDAY,
            first_day_of_month: DEFAULT_FIRST_DAY_OF_MONTH,
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatchUpSettings {
    pub cooldown_secs: u32,
    pub max_occurrences_per_pass: usize,
}

impl Default for CatchUpSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS as u32,
            max_occurrences_per_pass: DEFAULT_MAX_OCCURRENCES_PER_PASS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub calendar: CalendarSettings,
    pub catch_up: CatchUpSettings,
    /// Ledger store file; defaults to `ledger.json` in the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl Config {
    pub fn calendar_policy(&self) -> Result<CalendarPolicy> {
        CalendarPolicy::new(
            self.calendar.first_weekday,
            self.calendar.first_day_of_month,
            self.calendar.utc_offset_minutes,
        )
    }

    pub fn engine_settings(&self) -> Result<EngineSettings> {
        if self.catch_up.max_occurrences_per_pass == 0 {
            return Err(EngineError::Config(
                "max_occurrences_per_pass must be at least 1".into(),
            ));
        }
        Ok(EngineSettings {
            policy: self.calendar_policy()?,
            cooldown: Duration::seconds(self.catch_up.cooldown_secs as i64),
            max_occurrences_per_pass: self.catch_up.max_occurrences_per_pass,
        })
    }
}

pub struct ConfigManager {
    base: PathBuf,
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::with_base_dir(app_data_dir())
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self> {
        ensure_dir(&base)?;
        Ok(Self {
            path: config_file_in(&base),
            base,
        })
    }

    pub fn load(&self) -> Result<Config> {
        if self.path.exists() {
            let data = fs::read_to_string(&self.path)?;
            serde_json::from_str(&data)
                .map_err(|err| EngineError::Config(format!("{}: {err}", self.path.display())))
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        write_atomic(&self.path, &json)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store file named by the config, or the default one in the data directory.
    pub fn store_path(&self, config: &Config) -> PathBuf {
        config
            .store_path
            .clone()
            .unwrap_or_else(|| store_file_in(&self.base))
    }
}
