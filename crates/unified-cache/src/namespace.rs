use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Point-in-time counters for one namespace. `hit_rate` is computed, not stored,
/// so it can never drift out of sync with `hits`/`misses`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64 * 100.0
        }
    }
}

struct Entry {
    value: serde_json::Value,
    cached_at: Instant,
    ttl: Duration,
}

struct Inner {
    order: VecDeque<String>,
    map: HashMap<String, Entry>,
    stats: CacheStats,
}

/// A single namespace with TTL-on-read expiry and LRU eviction by capacity.
/// Each domain (price, regime, cycles, ohlcv, generic) gets its own instance
/// with independent settings — mirroring the namespace-per-domain design this
/// is grounded on, just with an explicit order queue standing in for an
/// order-preserving map.
pub struct CacheNamespace {
    name: String,
    max_entries: usize,
    default_ttl: Duration,
    inner: Mutex<Inner>,
}

impl CacheNamespace {
    pub fn new(name: impl Into<String>, max_entries: usize, default_ttl: Duration) -> Self {
        let name = name.into();
        Self {
            name,
            max_entries,
            default_ttl,
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                map: HashMap::new(),
                stats: CacheStats { max_entries, ..Default::default() },
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `None` on miss or expiry. A read that finds an expired entry
    /// deletes it immediately rather than leaving it for a later sweep.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut inner = self.inner.lock().expect("cache namespace mutex poisoned");

        let expired = match inner.map.get(key) {
            Some(entry) => entry.cached_at.elapsed() > entry.ttl,
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if expired {
            inner.map.remove(key);
            remove_from_order(&mut inner.order, key);
            inner.stats.current_entries = inner.map.len();
            inner.stats.misses += 1;
            return None;
        }

        move_to_end(&mut inner.order, key);
        inner.stats.hits += 1;
        inner.map.get(key).map(|e| e.value.clone())
    }

    /// Inserts or overwrites `key`. `ttl` overrides the namespace default for this entry only.
    pub fn set(&self, key: &str, value: serde_json::Value, ttl: Option<Duration>) {
        let mut inner = self.inner.lock().expect("cache namespace mutex poisoned");

        let ttl = ttl.unwrap_or(self.default_ttl);
        inner.map.insert(key.to_string(), Entry { value, cached_at: Instant::now(), ttl });
        move_to_end(&mut inner.order, key);

        while inner.order.len() > self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
                inner.stats.evictions += 1;
            }
        }

        inner.stats.current_entries = inner.map.len();
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().expect("cache namespace mutex poisoned");
        let existed = inner.map.remove(key).is_some();
        if existed {
            remove_from_order(&mut inner.order, key);
            inner.stats.current_entries = inner.map.len();
        }
        existed
    }

    /// Deletes every key for which `predicate` returns true. Used for invalidating
    /// every timeframe cached under a symbol prefix.
    pub fn delete_where(&self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        let mut inner = self.inner.lock().expect("cache namespace mutex poisoned");
        let to_delete: Vec<String> = inner.map.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &to_delete {
            inner.map.remove(key);
            remove_from_order(&mut inner.order, key);
        }
        inner.stats.current_entries = inner.map.len();
        to_delete.len()
    }

    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().expect("cache namespace mutex poisoned");
        let count = inner.map.len();
        inner.map.clear();
        inner.order.clear();
        inner.stats.current_entries = 0;
        count
    }

    pub fn stats(&self) -> CacheStats {
        let mut inner = self.inner.lock().expect("cache namespace mutex poisoned");
        inner.stats.current_entries = inner.map.len();
        inner.stats
    }
}

fn move_to_end(order: &mut VecDeque<String>, key: &str) {
    remove_from_order(order, key);
    order.push_back(key.to_string());
}

fn remove_from_order(order: &mut VecDeque<String>, key: &str) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        order.remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let ns = CacheNamespace::new("test", 10, Duration::from_secs(60));
        ns.set("a", json!({"x": 1}), None);
        assert_eq!(ns.get("a"), Some(json!({"x": 1})));
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_removed() {
        let ns = CacheNamespace::new("test", 10, Duration::from_millis(1));
        ns.set("a", json!(1), None);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(ns.get("a"), None);
        assert_eq!(ns.stats().current_entries, 0);
    }

    #[test]
    fn over_capacity_evicts_least_recently_used() {
        let ns = CacheNamespace::new("test", 2, Duration::from_secs(60));
        ns.set("a", json!(1), None);
        ns.set("b", json!(2), None);
        ns.get("a"); // touch a, making b the LRU entry
        ns.set("c", json!(3), None);
        assert_eq!(ns.get("b"), None);
        assert!(ns.get("a").is_some());
        assert!(ns.get("c").is_some());
        assert_eq!(ns.stats().evictions, 1);
    }

    #[test]
    fn per_entry_ttl_overrides_default() {
        let ns = CacheNamespace::new("test", 10, Duration::from_secs(60));
        ns.set("a", json!(1), Some(Duration::from_millis(1)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(ns.get("a"), None);
    }

    #[test]
    fn delete_where_matches_prefix() {
        let ns = CacheNamespace::new("test", 10, Duration::from_secs(60));
        ns.set("BTC:1h", json!(1), None);
        ns.set("BTC:1d", json!(1), None);
        ns.set("ETH:1h", json!(1), None);
        let removed = ns.delete_where(|k| k.starts_with("BTC:"));
        assert_eq!(removed, 2);
        assert!(ns.get("ETH:1h").is_some());
    }
}
