//! Persistence for BTC/stablecoin dominance snapshots (§2.2, §6). The dominance
//! *fetcher* is an external contract this crate never implements; what lands
//! here is the cache file the risk-appetite axis reads and the append-only
//! history trail kept alongside it. Both files use the same temp-file-then-
//! rename-under-lock pattern as the cooldown store.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fs2::FileExt;
use market_types::ScanError;
use serde::{Deserialize, Serialize};

use crate::DominanceInputs;

const CACHE_TTL: Duration = Duration::hours(24);
const HISTORY_CAP: usize = 30 * 24;
const HISTORY_MIN_GAP: Duration = Duration::hours(1);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DominanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub btc_dom: f64,
    pub stable_dom: f64,
    pub alt_dom: f64,
    pub total_market_cap: f64,
    pub btc_market_cap: f64,
    pub stable_market_cap: f64,
    pub alt_market_cap: f64,
}

impl From<DominanceSnapshot> for DominanceInputs {
    fn from(s: DominanceSnapshot) -> Self {
        DominanceInputs { btc_dominance_pct: Some(s.btc_dom), stablecoin_dominance_pct: Some(s.stable_dom) }
    }
}

/// Reads `dominance_cache.json`, returning `None` if the file is missing,
/// unparseable, or older than the 24h TTL.
pub fn load_cache(path: impl AsRef<Path>) -> Option<DominanceSnapshot> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).ok()?;
    let snapshot: DominanceSnapshot = serde_json::from_str(&raw).ok()?;
    if Utc::now() - snapshot.timestamp > CACHE_TTL {
        return None;
    }
    Some(snapshot)
}

/// Writes the cache file and appends to the history file, both atomically
/// under an exclusive lock on a sibling `.lock` file. History only grows when
/// the new snapshot is at least [`HISTORY_MIN_GAP`] after the last entry.
pub fn save(cache_path: impl AsRef<Path>, history_path: impl AsRef<Path>, snapshot: DominanceSnapshot) -> Result<(), ScanError> {
    let cache_path = cache_path.as_ref();
    let history_path = history_path.as_ref();
    let dir = cache_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| ScanError::InternalError(format!("failed to create {}: {e}", dir.display())))?;

    let lock_path = cache_path.with_extension("lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| ScanError::InternalError(format!("failed to open lock file {}: {e}", lock_path.display())))?;
    lock_file
        .lock_exclusive()
        .map_err(|e| ScanError::InternalError(format!("failed to acquire dominance cache lock: {e}")))?;

    let result = write_cache_and_history(cache_path, history_path, snapshot);
    let _ = fs2::FileExt::unlock(&lock_file);
    result
}

fn write_cache_and_history(cache_path: &Path, history_path: &Path, snapshot: DominanceSnapshot) -> Result<(), ScanError> {
    let dir = cache_path.parent().unwrap_or_else(|| Path::new("."));
    atomic_write_json(cache_path, dir, &snapshot)?;

    let mut history: Vec<DominanceSnapshot> = std::fs::read_to_string(history_path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    let should_append = match history.last() {
        Some(last) => snapshot.timestamp - last.timestamp >= HISTORY_MIN_GAP,
        None => true,
    };
    if should_append {
        history.push(snapshot);
        let cutoff = Utc::now() - Duration::days(30);
        history.retain(|s| s.timestamp >= cutoff);
        if history.len() > HISTORY_CAP {
            let drop = history.len() - HISTORY_CAP;
            history.drain(0..drop);
        }
        atomic_write_json(history_path, dir, &history)?;
    }

    Ok(())
}

fn atomic_write_json<T: Serialize>(path: &Path, dir: &Path, value: &T) -> Result<(), ScanError> {
    let serialized = serde_json::to_string_pretty(value).map_err(|e| ScanError::InternalError(format!("failed to serialize {}: {e}", path.display())))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ScanError::InternalError(format!("failed to create temp file: {e}")))?;
    tmp.write_all(serialized.as_bytes()).map_err(|e| ScanError::InternalError(format!("failed to write temp file: {e}")))?;
    tmp.as_file().sync_all().map_err(|e| ScanError::InternalError(format!("failed to fsync temp file: {e}")))?;
    tmp.persist(path).map_err(|e| ScanError::InternalError(format!("failed to rename temp file into place: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(ts: DateTime<Utc>) -> DominanceSnapshot {
        DominanceSnapshot {
            timestamp: ts,
            btc_dom: 52.0,
            stable_dom: 6.0,
            alt_dom: 42.0,
            total_market_cap: 2.5e12,
            btc_market_cap: 1.3e12,
            stable_market_cap: 1.5e11,
            alt_market_cap: 1.05e12,
        }
    }

    #[test]
    fn missing_cache_loads_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_cache(dir.path().join("dominance_cache.json")).is_none());
    }

    #[test]
    fn fresh_snapshot_survives_a_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("dominance_cache.json");
        let history_path = dir.path().join("dominance_history.json");
        save(&cache_path, &history_path, snapshot(Utc::now())).unwrap();
        let loaded = load_cache(&cache_path).unwrap();
        assert_eq!(loaded.btc_dom, 52.0);
    }

    #[test]
    fn stale_cache_is_not_returned() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("dominance_cache.json");
        let history_path = dir.path().join("dominance_history.json");
        save(&cache_path, &history_path, snapshot(Utc::now() - Duration::hours(25))).unwrap();
        assert!(load_cache(&cache_path).is_none());
    }

    #[test]
    fn history_skips_entries_closer_than_the_minimum_gap() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("dominance_cache.json");
        let history_path = dir.path().join("dominance_history.json");
        let now = Utc::now();
        save(&cache_path, &history_path, snapshot(now)).unwrap();
        save(&cache_path, &history_path, snapshot(now + Duration::minutes(10))).unwrap();

        let raw = std::fs::read_to_string(&history_path).unwrap();
        let history: Vec<DominanceSnapshot> = serde_json::from_str(&raw).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn history_appends_once_the_gap_is_cleared() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("dominance_cache.json");
        let history_path = dir.path().join("dominance_history.json");
        let now = Utc::now();
        save(&cache_path, &history_path, snapshot(now)).unwrap();
        save(&cache_path, &history_path, snapshot(now + Duration::hours(2))).unwrap();

        let raw = std::fs::read_to_string(&history_path).unwrap();
        let history: Vec<DominanceSnapshot> = serde_json::from_str(&raw).unwrap();
        assert_eq!(history.len(), 2);
    }
}
