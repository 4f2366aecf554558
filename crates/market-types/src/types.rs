use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// A single OHLCV candle. Constructed only by ingest; immutable afterward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Checks the OHLCV invariant: `low <= min(open,close) <= max(open,close) <= high`, `volume >= 0`.
    pub fn is_valid(&self) -> bool {
        let lo = self.open.min(self.close);
        let hi = self.open.max(self.close);
        self.low <= lo && hi <= self.high && self.volume >= 0.0 && self.low.is_finite() && self.high.is_finite()
    }

    pub fn validate(self) -> Result<Bar, ScanError> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(ScanError::BadOhlcv(format!(
                "bar at {} violates low<=o,c<=high or volume>=0 (o={} h={} l={} c={} v={})",
                self.timestamp, self.open, self.high, self.low, self.close, self.volume
            )))
        }
    }
}

/// Fixed enumeration of timeframe codes, each mapped to a duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    MO1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 15] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H2,
        Timeframe::H4,
        Timeframe::H6,
        Timeframe::H8,
        Timeframe::H12,
        Timeframe::D1,
        Timeframe::D3,
        Timeframe::W1,
        Timeframe::MO1,
    ];

    /// Duration of one bar in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M3 => 180,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H2 => 7_200,
            Timeframe::H4 => 14_400,
            Timeframe::H6 => 21_600,
            Timeframe::H8 => 28_800,
            Timeframe::H12 => 43_200,
            Timeframe::D1 => 86_400,
            Timeframe::D3 => 259_200,
            Timeframe::W1 => 604_800,
            Timeframe::MO1 => 2_592_000,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
            Timeframe::MO1 => "1M",
        }
    }

    pub fn from_code(code: &str) -> Option<Timeframe> {
        Self::ALL.into_iter().find(|tf| tf.code() == code)
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Trade direction a candidate signal is evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// One symbol's multi-timeframe OHLCV bundle. Created per scan iteration for a symbol,
/// discarded once that symbol's pipeline run completes.
#[derive(Debug, Clone, Default)]
pub struct MtfBundle {
    pub symbol: String,
    series: std::collections::HashMap<Timeframe, Vec<Bar>>,
}

impl MtfBundle {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            series: std::collections::HashMap::new(),
        }
    }

    /// Inserts a timeframe's bars after validating ordering invariants: strictly
    /// monotonic timestamps spaced by the timeframe's duration.
    pub fn insert(&mut self, tf: Timeframe, bars: Vec<Bar>) -> Result<(), ScanError> {
        let spacing = chrono::Duration::seconds(tf.seconds());
        for w in bars.windows(2) {
            let gap = w[1].timestamp - w[0].timestamp;
            if gap != spacing {
                return Err(ScanError::BadOhlcv(format!(
                    "{} series not monotonic/evenly spaced at {}: gap {}s != expected {}s",
                    tf,
                    w[1].timestamp,
                    gap.num_seconds(),
                    spacing.num_seconds()
                )));
            }
        }
        self.series.insert(tf, bars);
        Ok(())
    }

    pub fn get(&self, tf: Timeframe) -> Option<&[Bar]> {
        self.series.get(&tf).map(|v| v.as_slice())
    }

    pub fn has_min_bars(&self, tf: Timeframe, min: usize) -> bool {
        self.series.get(&tf).is_some_and(|v| v.len() >= min)
    }

    pub fn timeframes(&self) -> impl Iterator<Item = &Timeframe> {
        self.series.keys()
    }
}
