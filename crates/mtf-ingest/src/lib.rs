//! Fetches and assembles a symbol's multi-timeframe OHLCV bundle (§4.2).
//! Adapters are treated as untrusted: every bar is re-validated here and dropped
//! on invariant breaks rather than trusted to have arrived clean.

use exchange_adapter::ExchangeAdapter;
use market_types::{Bar, MtfBundle, ScanError, Timeframe};
use unified_cache::UnifiedCache;

/// What a single ingest call needs: the symbol, the timeframes required, how
/// many clean bars each must have, and which of those timeframes is the
/// primary HTF whose absence aborts the symbol entirely.
#[derive(Debug, Clone)]
pub struct IngestRequest<'a> {
    pub symbol: &'a str,
    pub timeframes: &'a [Timeframe],
    pub min_bars: usize,
    pub primary_htf: Timeframe,
}

/// Fetches every requested timeframe concurrently (cache-then-adapter), validates
/// and assembles them into an [`MtfBundle`]. A timeframe that ends up short of
/// `min_bars` after cleaning is simply absent from the bundle; only a missing
/// primary HTF fails the whole call.
pub async fn assemble_bundle(
    adapter: &dyn ExchangeAdapter,
    cache: &UnifiedCache,
    req: IngestRequest<'_>,
) -> Result<MtfBundle, ScanError> {
    let fetches = req.timeframes.iter().map(|&tf| fetch_one(adapter, cache, req.symbol, tf, req.min_bars));
    let results = futures_util::future::join_all(fetches).await;

    let mut bundle = MtfBundle::new(req.symbol);
    for (tf, outcome) in req.timeframes.iter().zip(results) {
        match outcome {
            Ok(bars) => {
                bundle.insert(*tf, bars)?;
            }
            Err(e) => {
                tracing::debug!(symbol = req.symbol, timeframe = %tf, error = %e, "timeframe dropped from bundle");
            }
        }
    }

    if !bundle.has_min_bars(req.primary_htf, req.min_bars) {
        return Err(ScanError::DataUnavailable(format!(
            "{} missing primary timeframe {} after ingest",
            req.symbol, req.primary_htf
        )));
    }

    Ok(bundle)
}

async fn fetch_one(
    adapter: &dyn ExchangeAdapter,
    cache: &UnifiedCache,
    symbol: &str,
    tf: Timeframe,
    min_bars: usize,
) -> Result<Vec<Bar>, ScanError> {
    if let Some(cached) = cache.get_ohlcv::<Vec<Bar>>(symbol, tf) {
        if cached.len() >= min_bars {
            return Ok(cached);
        }
    }

    let raw = adapter.fetch_ohlcv(symbol, tf, min_bars, None).await?;
    let cleaned = clean(raw);

    if cleaned.len() < min_bars {
        return Err(ScanError::InsufficientData(format!(
            "{symbol} {tf}: {} clean bars, need {min_bars}",
            cleaned.len()
        )));
    }

    cache.set_ohlcv(symbol, tf, &cleaned);
    Ok(cleaned)
}

/// Drops malformed bars (logging each) and sorts the remainder ascending by timestamp.
fn clean(bars: Vec<Bar>) -> Vec<Bar> {
    let mut cleaned: Vec<Bar> = bars
        .into_iter()
        .filter_map(|b| match b.validate() {
            Ok(b) => Some(b),
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed bar");
                None
            }
        })
        .collect();
    cleaned.sort_by_key(|b| b.timestamp);
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use exchange_adapter::FakeAdapter;

    fn bar(hour: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.timestamp_opt(hour * 3600, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    #[tokio::test]
    async fn assembles_bundle_from_adapter_on_cache_miss() {
        let bars: Vec<Bar> = (0..30).map(|i| bar(i, 100.0, 101.0, 99.0, 100.5)).collect();
        let adapter = FakeAdapter::new("fake").with_bars("BTC/USDT", Timeframe::H1, bars);
        let cache = UnifiedCache::global();

        let req = IngestRequest { symbol: "BTC/USDT", timeframes: &[Timeframe::H1], min_bars: 20, primary_htf: Timeframe::H1 };
        let bundle = assemble_bundle(&adapter, cache, req).await.unwrap();
        assert!(bundle.has_min_bars(Timeframe::H1, 20));
    }

    #[tokio::test]
    async fn missing_primary_htf_is_data_unavailable() {
        let adapter = FakeAdapter::new("fake");
        let cache = UnifiedCache::global();

        let req = IngestRequest { symbol: "NOPE/USDT", timeframes: &[Timeframe::H1], min_bars: 20, primary_htf: Timeframe::H1 };
        let result = assemble_bundle(&adapter, cache, req).await;
        assert!(matches!(result, Err(ScanError::DataUnavailable(_))));
    }

    #[test]
    fn clean_drops_bad_bars_and_sorts() {
        let good = bar(1, 100.0, 101.0, 99.0, 100.5);
        let bad = Bar { timestamp: Utc.timestamp_opt(0, 0).unwrap(), open: 100.0, high: 90.0, low: 99.0, close: 100.0, volume: 1.0 };
        let earlier = bar(0, 100.0, 101.0, 99.0, 100.0);
        let cleaned = clean(vec![good, bad, earlier]);
        assert_eq!(cleaned.len(), 2);
        assert!(cleaned[0].timestamp < cleaned[1].timestamp);
    }
}
