//! Persistent cooldown store (§4.9). A trade cooldown blocks re-entry into a
//! symbol/direction for a set duration, typically after a stop-out, and must
//! survive a process restart. Backed by a single JSON file; every write goes
//! through a temp-file-then-rename swap guarded by an exclusive file lock so
//! two processes never interleave writes.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use market_types::{Direction, ScanError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub expires_at: DateTime<Utc>,
    pub price: f64,
    pub reason: String,
}

type OnDiskSchema = HashMap<String, HashMap<String, CooldownEntry>>;

struct State {
    cooldowns: HashMap<String, HashMap<Direction, CooldownEntry>>,
}

pub struct CooldownStore {
    storage_path: PathBuf,
    state: Mutex<State>,
}

impl CooldownStore {
    /// Loads existing cooldowns from `storage_path`, dropping anything already expired.
    pub fn load(storage_path: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let storage_path = storage_path.into();
        let cooldowns = Self::read_from_disk(&storage_path)?;
        let active = cooldowns.len();
        tracing::info!(path = %storage_path.display(), entries = active, "loaded cooldown store");
        Ok(Self { storage_path, state: Mutex::new(State { cooldowns }) })
    }

    fn read_from_disk(path: &Path) -> Result<HashMap<String, HashMap<Direction, CooldownEntry>>, ScanError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| ScanError::InternalError(format!("failed to read {}: {e}", path.display())))?;
        let on_disk: OnDiskSchema = serde_json::from_str(&raw).map_err(|e| ScanError::InternalError(format!("failed to parse {}: {e}", path.display())))?;

        let now = Utc::now();
        let mut cooldowns = HashMap::new();
        for (symbol, directions) in on_disk {
            let mut kept = HashMap::new();
            for (direction_key, entry) in directions {
                if entry.expires_at <= now {
                    continue;
                }
                if let Some(direction) = direction_from_key(&direction_key) {
                    kept.insert(direction, entry);
                }
            }
            if !kept.is_empty() {
                cooldowns.insert(symbol, kept);
            }
        }
        Ok(cooldowns)
    }

    /// Adds a cooldown and persists it before returning.
    pub fn add(&self, symbol: &str, direction: Direction, price: f64, reason: impl Into<String>, hours: i64) -> Result<(), ScanError> {
        let reason = reason.into();
        let expires_at = Utc::now() + Duration::hours(hours);
        {
            let mut state = self.state.lock().unwrap();
            let entry = CooldownEntry { expires_at, price, reason: reason.clone() };
            state.cooldowns.entry(symbol.to_string()).or_default().insert(direction, entry);
        }
        tracing::info!(symbol, ?direction, hours, reason = %reason, "cooldown added");
        self.persist()
    }

    /// Returns the active entry for `(symbol, direction)`, lazily deleting it in
    /// memory if expired. The deletion is not forced to disk on a read.
    pub fn is_active(&self, symbol: &str, direction: Direction) -> Option<CooldownEntry> {
        let mut state = self.state.lock().unwrap();
        let directions = state.cooldowns.get_mut(symbol)?;
        let entry = directions.get(&direction)?;

        if entry.expires_at > Utc::now() {
            return Some(entry.clone());
        }

        directions.remove(&direction);
        if directions.is_empty() {
            state.cooldowns.remove(symbol);
        }
        None
    }

    /// Clears one direction, or every direction for `symbol` when `direction` is `None`.
    pub fn clear(&self, symbol: &str, direction: Option<Direction>) -> Result<(), ScanError> {
        {
            let mut state = self.state.lock().unwrap();
            match direction {
                Some(direction) => {
                    if let Some(directions) = state.cooldowns.get_mut(symbol) {
                        directions.remove(&direction);
                        if directions.is_empty() {
                            state.cooldowns.remove(symbol);
                        }
                    }
                }
                None => {
                    state.cooldowns.remove(symbol);
                }
            }
        }
        tracing::info!(symbol, ?direction, "cooldown cleared");
        self.persist()
    }

    fn persist(&self) -> Result<(), ScanError> {
        let dir = self.storage_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| ScanError::InternalError(format!("failed to create {}: {e}", dir.display())))?;

        let lock_path = self.storage_path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| ScanError::InternalError(format!("failed to open lock file {}: {e}", lock_path.display())))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| ScanError::InternalError(format!("failed to acquire cooldown store lock: {e}")))?;

        let result = self.write_snapshot(dir);
        let _ = fs2::FileExt::unlock(&lock_file);
        result
    }

    fn write_snapshot(&self, dir: &Path) -> Result<(), ScanError> {
        let now = Utc::now();
        let mut on_disk: OnDiskSchema = HashMap::new();
        {
            let state = self.state.lock().unwrap();
            for (symbol, directions) in &state.cooldowns {
                let mut kept = HashMap::new();
                for (direction, entry) in directions {
                    if entry.expires_at > now {
                        kept.insert(direction_to_key(*direction).to_string(), entry.clone());
                    }
                }
                if !kept.is_empty() {
                    on_disk.insert(symbol.clone(), kept);
                }
            }
        }

        let serialized = serde_json::to_string_pretty(&on_disk).map_err(|e| ScanError::InternalError(format!("failed to serialize cooldowns: {e}")))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ScanError::InternalError(format!("failed to create temp file: {e}")))?;
        tmp.write_all(serialized.as_bytes()).map_err(|e| ScanError::InternalError(format!("failed to write temp file: {e}")))?;
        tmp.as_file().sync_all().map_err(|e| ScanError::InternalError(format!("failed to fsync temp file: {e}")))?;
        tmp.persist(&self.storage_path).map_err(|e| ScanError::InternalError(format!("failed to rename temp file into place: {e}")))?;
        Ok(())
    }
}

fn direction_to_key(direction: Direction) -> &'static str {
    match direction {
        Direction::Long => "long",
        Direction::Short => "short",
    }
}

fn direction_from_key(key: &str) -> Option<Direction> {
    match key {
        "long" => Some(Direction::Long),
        "short" => Some(Direction::Short),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CooldownStore {
        CooldownStore::load(dir.path().join("cooldowns.json")).unwrap()
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.is_active("BTC/USDT", Direction::Long).is_none());
    }

    #[test]
    fn add_then_is_active_returns_the_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add("BTC/USDT", Direction::Long, 64_000.0, "stop_loss", 24).unwrap();
        let entry = store.is_active("BTC/USDT", Direction::Long).unwrap();
        assert_eq!(entry.reason, "stop_loss");
        assert!(store.is_active("BTC/USDT", Direction::Short).is_none());
    }

    #[test]
    fn survives_a_reload_within_the_window() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir);
            store.add("ETH/USDT", Direction::Short, 3_000.0, "stop_loss", 24).unwrap();
        }
        let reloaded = store_in(&dir);
        let entry = reloaded.is_active("ETH/USDT", Direction::Short).unwrap();
        assert!(entry.expires_at > Utc::now());
    }

    #[test]
    fn expired_entry_does_not_survive_reload() {
        let dir = TempDir::new().unwrap();
        {
            let store = store_in(&dir);
            store.add("ETH/USDT", Direction::Short, 3_000.0, "stop_loss", -1).unwrap();
        }
        let reloaded = store_in(&dir);
        assert!(reloaded.is_active("ETH/USDT", Direction::Short).is_none());
    }

    #[test]
    fn clear_removes_a_single_direction_only() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add("BTC/USDT", Direction::Long, 64_000.0, "stop_loss", 24).unwrap();
        store.add("BTC/USDT", Direction::Short, 64_000.0, "manual", 24).unwrap();
        store.clear("BTC/USDT", Some(Direction::Long)).unwrap();
        assert!(store.is_active("BTC/USDT", Direction::Long).is_none());
        assert!(store.is_active("BTC/USDT", Direction::Short).is_some());
    }

    #[test]
    fn clear_without_direction_removes_the_whole_symbol() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.add("BTC/USDT", Direction::Long, 64_000.0, "stop_loss", 24).unwrap();
        store.add("BTC/USDT", Direction::Short, 64_000.0, "manual", 24).unwrap();
        store.clear("BTC/USDT", None).unwrap();
        assert!(store.is_active("BTC/USDT", Direction::Long).is_none());
        assert!(store.is_active("BTC/USDT", Direction::Short).is_none());
    }
}
