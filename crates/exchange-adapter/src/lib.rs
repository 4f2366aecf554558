//! External contract for exchange adapters (§4.1). No concrete exchange integration
//! ships here — only the trait the core programs against, the shared retry policy,
//! and a deterministic in-memory fake used by downstream tests.

pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_types::{Bar, ScanError, Timeframe};
use serde::{Deserialize, Serialize};

pub use retry::{RetryPolicy, RetryableError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// Operations the scan pipeline consumes from any exchange integration.
/// Implementations must be internally concurrency-safe (the core calls them
/// from multiple worker tasks without external synchronization) and must
/// apply [`RetryPolicy`] around their own network calls.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange_name(&self) -> &str;

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, ScanError>;

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ScanError>;

    async fn list_top_symbols(&self, n: usize, quote_currency: &str) -> Result<Vec<String>, ScanError>;

    async fn is_perpetual(&self, symbol: &str) -> Result<bool, ScanError>;
}

/// A deterministic, in-memory adapter for tests. Not a production exchange
/// integration: every method reads from data seeded by the test, never the network.
#[derive(Debug, Default, Clone)]
pub struct FakeAdapter {
    pub name: String,
    pub bars: std::collections::HashMap<(String, Timeframe), Vec<Bar>>,
    pub tickers: std::collections::HashMap<String, Ticker>,
    pub top_symbols: Vec<String>,
    pub perpetuals: std::collections::HashSet<String>,
}

impl FakeAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_bars(mut self, symbol: &str, tf: Timeframe, bars: Vec<Bar>) -> Self {
        self.bars.insert((symbol.to_string(), tf), bars);
        self
    }
}

#[async_trait]
impl ExchangeAdapter for FakeAdapter {
    fn exchange_name(&self) -> &str {
        &self.name
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>, ScanError> {
        match self.bars.get(&(symbol.to_string(), timeframe)) {
            Some(bars) => {
                let start = bars.len().saturating_sub(limit);
                Ok(bars[start..].to_vec())
            }
            None => Err(ScanError::DataUnavailable(format!("no fixture bars for {symbol} {timeframe}"))),
        }
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker, ScanError> {
        self.tickers
            .get(symbol)
            .copied()
            .ok_or_else(|| ScanError::DataUnavailable(format!("no fixture ticker for {symbol}")))
    }

    async fn list_top_symbols(&self, n: usize, _quote_currency: &str) -> Result<Vec<String>, ScanError> {
        Ok(self.top_symbols.iter().take(n).cloned().collect())
    }

    async fn is_perpetual(&self, symbol: &str) -> Result<bool, ScanError> {
        Ok(self.perpetuals.contains(symbol))
    }
}
