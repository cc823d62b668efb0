//! Persisted, restart-safe rate limiter for oracle calls.
//!
//! Every admission reloads the ledger under an in-process mutex and a
//! cross-process lock file, records the call, and writes the ledger back
//! before returning. Neither lock is held while waiting for the minute
//! window to open.

mod clock;
mod ledger;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{
    LedgerLock, LedgerStore, LoadedLedger, RateLedger, LEDGER_VERSION, TIMESTAMP_HORIZON, WINDOW,
};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{GovernorError, LedgerError};
use crate::models::config::GovernorConfig;
use crate::observe::{GovernorEvent, Observer, TracingObserver};

/// A granted call.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub date: NaiveDate,
    /// Calls counted today, this one included.
    pub daily_count: u32,
    /// Calls in the last minute, this one included.
    pub window_count: usize,
    /// Time spent waiting for the minute window.
    pub waited: Duration,
}

/// Snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernorStatus {
    pub date: NaiveDate,
    pub requests_today: u32,
    pub requests_last_minute: usize,
    pub max_per_day: u32,
    pub max_per_minute: u32,
    pub remaining_today: u32,
    pub ledger_path: PathBuf,
}

/// Configures and opens a [`CallGovernor`].
pub struct GovernorBuilder {
    path: PathBuf,
    per_minute: u32,
    per_day: u32,
    retention_days: u32,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
}

impl GovernorBuilder {
    pub fn with_limits(mut self, per_minute: u32, per_day: u32) -> Self {
        self.per_minute = per_minute;
        self.per_day = per_day;
        self
    }

    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Ceilings and retention from configuration.
    pub fn with_config(self, config: &GovernorConfig) -> Self {
        self.with_limits(config.max_requests_per_minute, config.max_requests_per_day)
            .with_retention_days(config.retention_days)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Validate limits, then load, prune and rewrite the ledger.
    pub fn open(self) -> Result<CallGovernor, GovernorError> {
        if self.per_minute == 0 || self.per_day == 0 {
            return Err(GovernorError::InvalidLimits(format!(
                "ceilings must be positive (per minute {}, per day {})",
                self.per_minute, self.per_day
            )));
        }

        let governor = CallGovernor {
            store: LedgerStore::new(self.path),
            per_minute: self.per_minute,
            per_day: self.per_day,
            retention_days: self.retention_days,
            clock: self.clock,
            observer: self.observer,
            guard: Mutex::new(()),
        };

        {
            let _local = governor.guard.lock().map_err(|_| LedgerError::Poisoned)?;
            let _file = governor.store.lock()?;
            let ledger = governor.load_pruned()?;
            governor.store.save(&ledger)?;
        }

        Ok(governor)
    }
}

/// The rate limiter. Share it behind an `Arc`.
pub struct CallGovernor {
    store: LedgerStore,
    per_minute: u32,
    per_day: u32,
    retention_days: u32,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn Observer>,
    guard: Mutex<()>,
}

impl CallGovernor {
    pub fn builder(path: impl Into<PathBuf>) -> GovernorBuilder {
        let defaults = GovernorConfig::default();
        GovernorBuilder {
            path: path.into(),
            per_minute: defaults.max_requests_per_minute,
            per_day: defaults.max_requests_per_day,
            retention_days: defaults.retention_days,
            clock: Arc::new(SystemClock),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn ledger_path(&self) -> &Path {
        self.store.path()
    }

    /// Wait as long as needed for a slot.
    pub fn admit(&self) -> Result<Admission, GovernorError> {
        self.admit_within(None)
    }

    /// Like [`admit`](Self::admit), but give up with `WaitTimeout` instead
    /// of waiting past `deadline`. Nothing is recorded on timeout.
    pub fn admit_within(&self, deadline: Option<Duration>) -> Result<Admission, GovernorError> {
        let started = self.clock.now();

        loop {
            let wait = {
                let _local = self.guard.lock().map_err(|_| LedgerError::Poisoned)?;
                let _file = self.store.lock()?;

                let mut ledger = self.load_pruned()?;
                let now = self.clock.now();
                let today = self.clock.today();

                let count = ledger.count_for(today);
                if count >= self.per_day {
                    self.observer.on_governor(&GovernorEvent::DailyLimitReached {
                        date: today,
                        count,
                        limit: self.per_day,
                    });
                    return Err(GovernorError::DailyLimitExceeded {
                        date: today,
                        count,
                        limit: self.per_day,
                    });
                }

                match ledger.window_wait(now, self.per_minute) {
                    None => {
                        ledger.record(now, today);
                        self.store.save(&ledger)?;

                        let admission = Admission {
                            date: today,
                            daily_count: ledger.count_for(today),
                            window_count: ledger.window(now).len(),
                            waited: (now - started).to_std().unwrap_or_default(),
                        };
                        self.observer.on_governor(&GovernorEvent::Admitted {
                            date: admission.date,
                            daily_count: admission.daily_count,
                            window_count: admission.window_count,
                        });
                        return Ok(admission);
                    }
                    Some(wait) => {
                        self.observer.on_governor(&GovernorEvent::Throttled {
                            wait,
                            window_count: ledger.window(now).len(),
                        });
                        wait
                    }
                }
            };

            if let Some(deadline) = deadline {
                let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();
                if elapsed + wait > deadline {
                    return Err(GovernorError::WaitTimeout {
                        deadline,
                        next_slot: wait,
                    });
                }
            }

            self.clock.sleep(wait);
        }
    }

    /// Current counts without recording anything.
    pub fn status(&self) -> Result<GovernorStatus, GovernorError> {
        let _local = self.guard.lock().map_err(|_| LedgerError::Poisoned)?;
        let _file = self.store.lock()?;
        let ledger = self.load_pruned()?;

        let today = self.clock.today();
        let requests_today = ledger.count_for(today);
        Ok(GovernorStatus {
            date: today,
            requests_today,
            requests_last_minute: ledger.window(self.clock.now()).len(),
            max_per_day: self.per_day,
            max_per_minute: self.per_minute,
            remaining_today: self.per_day.saturating_sub(requests_today),
            ledger_path: self.store.path().to_path_buf(),
        })
    }

    /// Calls still allowed today.
    pub fn remaining_today(&self) -> Result<u32, GovernorError> {
        self.status().map(|s| s.remaining_today)
    }

    /// Forget every recorded call.
    pub fn reset(&self) -> Result<(), GovernorError> {
        let _local = self.guard.lock().map_err(|_| LedgerError::Poisoned)?;
        let _file = self.store.lock()?;
        self.store.save(&RateLedger::default())?;
        Ok(())
    }

    fn load_pruned(&self) -> Result<RateLedger, LedgerError> {
        let loaded = self.store.load()?;
        if let Some(reason) = loaded.reset_reason {
            self.observer.on_governor(&GovernorEvent::LedgerReset {
                path: self.store.path().to_path_buf(),
                reason,
            });
        }
        let mut ledger = loaded.ledger;
        ledger.prune(self.clock.now(), self.clock.today(), self.retention_days);
        Ok(ledger)
    }
}

impl std::fmt::Debug for CallGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallGovernor")
            .field("ledger", &self.store.path())
            .field("per_minute", &self.per_minute)
            .field("per_day", &self.per_day)
            .finish()
    }
}
