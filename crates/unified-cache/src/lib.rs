//! Process-wide cache singleton with five independent namespaces (§4.8).
//! Each namespace has its own capacity and default TTL; `ohlcv` additionally
//! derives its per-entry TTL from the timeframe being cached.

pub mod namespace;

use std::sync::OnceLock;
use std::time::Duration;

use market_types::Timeframe;
use namespace::{CacheNamespace, CacheStats};
use serde::Serialize;
use serde::de::DeserializeOwned;

const OHLCV_TTL_BUFFER: Duration = Duration::from_secs(5);

pub struct UnifiedCache {
    price: CacheNamespace,
    regime: CacheNamespace,
    cycles: CacheNamespace,
    ohlcv: CacheNamespace,
    generic: CacheNamespace,
}

impl UnifiedCache {
    fn new() -> Self {
        tracing::info!("initializing unified cache namespaces");
        Self {
            price: CacheNamespace::new("price", 1000, Duration::from_secs(5)),
            regime: CacheNamespace::new("regime", 50, Duration::from_secs(60)),
            cycles: CacheNamespace::new("cycles", 100, Duration::from_secs(300)),
            ohlcv: CacheNamespace::new("ohlcv", 500, Duration::from_secs(300)),
            generic: CacheNamespace::new("generic", 500, Duration::from_secs(60)),
        }
    }

    /// The process-wide singleton. Constructed lazily on first access.
    pub fn global() -> &'static UnifiedCache {
        static INSTANCE: OnceLock<UnifiedCache> = OnceLock::new();
        INSTANCE.get_or_init(UnifiedCache::new)
    }

    pub fn get_price<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.price.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_price<T: Serialize>(&self, key: &str, value: &T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.price.set(key, v, None);
        }
    }

    pub fn get_regime<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.regime.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_regime<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Ok(v) = serde_json::to_value(value) {
            self.regime.set(key, v, ttl);
        }
    }

    pub fn get_cycles<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cycles.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_cycles<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Ok(v) = serde_json::to_value(value) {
            self.cycles.set(key, v, ttl);
        }
    }

    pub fn get_ohlcv<T: DeserializeOwned>(&self, symbol: &str, timeframe: Timeframe) -> Option<T> {
        let key = ohlcv_key(symbol, timeframe);
        self.ohlcv.get(&key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_ohlcv<T: Serialize>(&self, symbol: &str, timeframe: Timeframe, value: &T) {
        let key = ohlcv_key(symbol, timeframe);
        let ttl = Duration::from_secs(timeframe.seconds() as u64) + OHLCV_TTL_BUFFER;
        if let Ok(v) = serde_json::to_value(value) {
            self.ohlcv.set(&key, v, Some(ttl));
        }
    }

    /// Invalidates one timeframe for `symbol`, or every timeframe if `timeframe` is `None`.
    pub fn invalidate_ohlcv(&self, symbol: &str, timeframe: Option<Timeframe>) -> usize {
        match timeframe {
            Some(tf) => usize::from(self.ohlcv.delete(&ohlcv_key(symbol, tf))),
            None => {
                let prefix = format!("{symbol}:");
                self.ohlcv.delete_where(|k| k.starts_with(&prefix))
            }
        }
    }

    pub fn get_generic<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.generic.get(key).and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn set_generic<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Ok(v) = serde_json::to_value(value) {
            self.generic.set(key, v, ttl);
        }
    }

    /// Dominance snapshots ride the generic namespace under a reserved key prefix (§2.2).
    pub fn get_dominance<T: DeserializeOwned>(&self) -> Option<T> {
        self.get_generic("dominance:latest")
    }

    pub fn set_dominance<T: Serialize>(&self, value: &T) {
        self.set_generic("dominance:latest", value, Some(Duration::from_secs(300)));
    }

    pub fn all_stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            ("price", self.price.stats()),
            ("regime", self.regime.stats()),
            ("cycles", self.cycles.stats()),
            ("ohlcv", self.ohlcv.stats()),
            ("generic", self.generic.stats()),
        ]
    }
}

fn ohlcv_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("{symbol}:{}", timeframe.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ohlcv_round_trips_through_json() {
        let cache = UnifiedCache::new();
        let bars = vec![1.0, 2.0, 3.0];
        cache.set_ohlcv("BTC/USDT", Timeframe::H1, &bars);
        let got: Option<Vec<f64>> = cache.get_ohlcv("BTC/USDT", Timeframe::H1);
        assert_eq!(got, Some(bars));
    }

    #[test]
    fn invalidate_ohlcv_without_timeframe_clears_all() {
        let cache = UnifiedCache::new();
        cache.set_ohlcv("BTC/USDT", Timeframe::H1, &1.0);
        cache.set_ohlcv("BTC/USDT", Timeframe::D1, &2.0);
        cache.set_ohlcv("ETH/USDT", Timeframe::H1, &3.0);
        let removed = cache.invalidate_ohlcv("BTC/USDT", None);
        assert_eq!(removed, 2);
        assert!(cache.get_ohlcv::<f64>("ETH/USDT", Timeframe::H1).is_some());
    }

    #[test]
    fn global_is_a_true_singleton() {
        let a = UnifiedCache::global() as *const UnifiedCache;
        let b = UnifiedCache::global() as *const UnifiedCache;
        assert_eq!(a, b);
    }
}
