//! Persisted rate ledger and its on-disk store.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;

/// Current ledger schema version.
pub const LEDGER_VERSION: u32 = 1;

/// Length of the sliding window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Timestamps older than this are dropped from storage.
pub const TIMESTAMP_HORIZON: Duration = Duration::from_secs(3600);

const LOCK_RETRY: Duration = Duration::from_millis(25);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Counts and timestamps of admitted calls.
///
/// Unknown keys are ignored and missing ones defaulted, so older or
/// hand-edited files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLedger {
    pub version: u32,
    pub daily_counts: BTreeMap<NaiveDate, u32>,
    pub recent_timestamps: Vec<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for RateLedger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            daily_counts: BTreeMap::new(),
            recent_timestamps: Vec::new(),
            last_updated: None,
        }
    }
}

impl RateLedger {
    /// Drop daily counts older than `retention_days` and timestamps past the horizon.
    pub fn prune(&mut self, now: DateTime<Utc>, today: NaiveDate, retention_days: u32) {
        let oldest_day = today - chrono::Days::new(u64::from(retention_days));
        self.daily_counts.retain(|date, _| *date >= oldest_day);

        let horizon = now - to_chrono(TIMESTAMP_HORIZON);
        self.recent_timestamps.retain(|t| *t > horizon);
        self.recent_timestamps.sort();
        self.version = LEDGER_VERSION;
    }

    pub fn count_for(&self, date: NaiveDate) -> u32 {
        self.daily_counts.get(&date).copied().unwrap_or(0)
    }

    /// Timestamps inside the minute ending at `now`, oldest first.
    ///
    /// Calls stamped after `now` (the clock was set back) still count.
    pub fn window(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let start = now - to_chrono(WINDOW);
        self.recent_timestamps
            .iter()
            .copied()
            .filter(|t| *t > start)
            .collect()
    }

    /// How long until one more call fits under `per_minute`, or `None` if it fits now.
    pub fn window_wait(&self, now: DateTime<Utc>, per_minute: u32) -> Option<Duration> {
        let window = self.window(now);
        let limit = per_minute as usize;
        if window.len() < limit {
            return None;
        }
        // the entry that has to leave before the window drops below the limit
        let blocking = window[window.len() - limit];
        let exits_at = blocking + to_chrono(WINDOW);
        let wait = (exits_at - now).to_std().unwrap_or(Duration::ZERO);
        Some(wait.max(Duration::from_millis(1)))
    }

    /// Count one admitted call.
    pub fn record(&mut self, now: DateTime<Utc>, today: NaiveDate) {
        *self.daily_counts.entry(today).or_insert(0) += 1;
        self.recent_timestamps.push(now);
        self.last_updated = Some(now);
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// What [`LedgerStore::load`] found on disk.
#[derive(Debug, Clone)]
pub struct LoadedLedger {
    pub ledger: RateLedger,
    /// Set when an unreadable file was replaced by an empty ledger.
    pub reset_reason: Option<String>,
}

/// Reads and writes the ledger file.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn io_err(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Read the ledger. A missing file gives an empty ledger; so does a
    /// corrupt one, with the reason reported.
    pub fn load(&self) -> Result<LoadedLedger, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(LoadedLedger {
                    ledger: RateLedger::default(),
                    reset_reason: None,
                });
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Ok(LoadedLedger {
                    ledger: RateLedger::default(),
                    reset_reason: Some(e.to_string()),
                });
            }
            Err(e) => return Err(self.io_err(e)),
        };

        if content.trim().is_empty() {
            return Ok(LoadedLedger {
                ledger: RateLedger::default(),
                reset_reason: Some("empty file".to_string()),
            });
        }

        match serde_json::from_str::<RateLedger>(&content) {
            Ok(ledger) => Ok(LoadedLedger {
                ledger,
                reset_reason: None,
            }),
            Err(e) => Ok(LoadedLedger {
                ledger: RateLedger::default(),
                reset_reason: Some(e.to_string()),
            }),
        }
    }

    /// Write the ledger through a synced temp file renamed over the target.
    pub fn save(&self, ledger: &RateLedger) -> Result<(), LedgerError> {
        let dir = self.dir();
        fs::create_dir_all(&dir).map_err(|e| self.io_err(e))?;

        let bytes = serde_json::to_vec_pretty(ledger)?;
        let temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.io_err(e))?;

        let mut file = temp.as_file();
        file.write_all(&bytes).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;

        temp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        debug!("Saved rate ledger to {}", self.path.display());
        Ok(())
    }

    /// Take the cross-process lock beside the ledger file.
    ///
    /// A lock file older than 30 seconds is considered abandoned.
    pub fn lock(&self) -> Result<LedgerLock, LedgerError> {
        let lock_path = self.lock_path();
        fs::create_dir_all(self.dir()).map_err(|e| self.io_err(e))?;
        let started = Instant::now();

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let token = lock_token();
                    let _ = writeln!(file, "{token}");
                    return Ok(LedgerLock {
                        path: lock_path,
                        token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&lock_path) {
                        let stale = fs::read_to_string(&lock_path).unwrap_or_default();
                        break_stale_lock(&lock_path, &stale);
                        continue;
                    }
                    if started.elapsed() >= LOCK_TIMEOUT {
                        return Err(LedgerError::Lock {
                            path: lock_path,
                            waited: started.elapsed(),
                        });
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => {
                    return Err(LedgerError::Io {
                        path: lock_path,
                        source: e,
                    });
                }
            }
        }
    }
}

fn is_stale(lock_path: &Path) -> bool {
    fs::metadata(lock_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > LOCK_STALE_AFTER)
}

/// Process id plus creation time, written into the lock file.
fn lock_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{}", std::process::id(), nanos)
}

/// Move an abandoned lock aside and delete it, but only if what was moved
/// is still the stale lock `stale` was read from. A lock taken in between
/// is linked back in place.
fn break_stale_lock(lock_path: &Path, stale: &str) {
    let aside = lock_path.with_extension(format!("stale-{}", lock_token()));
    if fs::rename(lock_path, &aside).is_err() {
        // another process got there first
        return;
    }

    let moved = fs::read_to_string(&aside).unwrap_or_default();
    if moved.trim() == stale.trim() && is_stale(&aside) {
        debug!("Removed stale ledger lock {}", lock_path.display());
    } else {
        let _ = fs::hard_link(&aside, lock_path);
    }
    let _ = fs::remove_file(&aside);
}

/// Held cross-process lock; released on drop unless another process has
/// since taken it over.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
    token: String,
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let ours = fs::read_to_string(&self.path).is_ok_and(|c| c.trim() == self.token);
        if ours {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 3, h, m, s).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn test_window_wait() {
        let mut ledger = RateLedger::default();
        for s in [0, 10, 20] {
            ledger.record(at(10, 0, s), day(3));
        }

        assert_eq!(ledger.window_wait(at(10, 0, 30), 4), None);
        assert_eq!(
            ledger.window_wait(at(10, 0, 30), 3),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            ledger.window_wait(at(10, 0, 30), 2),
            Some(Duration::from_secs(40))
        );
        // the first call left the window exactly 60 seconds later
        assert_eq!(ledger.window_wait(at(10, 1, 0), 3), None);
    }

    #[test]
    fn test_prune() {
        let mut ledger = RateLedger::default();
        ledger.daily_counts.insert(day(1), 5);
        ledger.daily_counts.insert(NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(), 9);
        ledger.recent_timestamps = vec![at(10, 0, 0), at(8, 0, 0)];

        ledger.prune(at(10, 0, 30), day(3), 7);
        assert_eq!(ledger.daily_counts.len(), 1);
        assert_eq!(ledger.recent_timestamps, vec![at(10, 0, 0)]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));
        let loaded = store.load().unwrap();
        assert_eq!(loaded.ledger, RateLedger::default());
        assert!(loaded.reset_reason.is_none());
    }

    #[test]
    fn test_corrupt_file_resets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{ not json").unwrap();

        let loaded = LedgerStore::new(&path).load().unwrap();
        assert_eq!(loaded.ledger, RateLedger::default());
        assert!(loaded.reset_reason.is_some());
    }

    #[test]
    fn test_partial_file_defaults_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, r#"{"daily_counts": {"2025-06-03": 4}, "extra": true}"#).unwrap();

        let loaded = LedgerStore::new(&path).load().unwrap();
        assert_eq!(loaded.ledger.count_for(day(3)), 4);
        assert!(loaded.ledger.recent_timestamps.is_empty());
        assert!(loaded.reset_reason.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("nested").join("ledger.json"));
        let mut ledger = RateLedger::default();
        ledger.record(at(9, 0, 0), day(3));

        store.save(&ledger).unwrap();
        assert_eq!(store.load().unwrap().ledger, ledger);
    }

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));

        let lock = store.lock().unwrap();
        assert!(dir.path().join("ledger.json.lock").exists());
        drop(lock);
        assert!(!dir.path().join("ledger.json.lock").exists());
        let _again = store.lock().unwrap();
    }

    #[test]
    fn test_window_counts_calls_ahead_of_clock() {
        let mut ledger = RateLedger::default();
        ledger.record(at(10, 0, 0), day(3));
        ledger.record(at(10, 0, 10), day(3));

        // clock set back ten seconds
        let now = at(9, 59, 50);
        assert_eq!(ledger.window(now).len(), 2);
        assert_eq!(ledger.window_wait(now, 2), Some(Duration::from_secs(70)));
    }

    fn age(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_stale_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));
        let lock_path = dir.path().join("ledger.json.lock");
        fs::write(&lock_path, "4242-1\n").unwrap();
        age(&lock_path, Duration::from_secs(120));

        let lock = store.lock().unwrap();
        assert_ne!(fs::read_to_string(&lock_path).unwrap().trim(), "4242-1");
        drop(lock);
        assert!(!lock_path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_fresh_lock_survives_stale_break() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("ledger.json.lock");
        // judged stale as "4242-1", replaced by a live lock before the break
        fs::write(&lock_path, "7-99\n").unwrap();

        break_stale_lock(&lock_path, "4242-1");
        assert_eq!(fs::read_to_string(&lock_path).unwrap().trim(), "7-99");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_drop_keeps_lock_taken_by_another_process() {
        let dir = tempfile::tempdir().unwrap();
        let store = LedgerStore::new(dir.path().join("ledger.json"));
        let lock_path = dir.path().join("ledger.json.lock");

        let lock = store.lock().unwrap();
        fs::write(&lock_path, "7-99\n").unwrap();
        drop(lock);
        assert!(lock_path.exists());
    }
}
