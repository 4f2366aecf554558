use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scanner operating mode. Selects the threshold tables used by the regime detector
/// and the factor-weight tables used by the confluence scorer (§4.4, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeProfile {
    MacroSurveillance,
    StealthBalanced,
    IntradayAggressive,
    Precision,
}

impl ModeProfile {
    pub const ALL: [ModeProfile; 4] = [
        ModeProfile::MacroSurveillance,
        ModeProfile::StealthBalanced,
        ModeProfile::IntradayAggressive,
        ModeProfile::Precision,
    ];

    /// `(min_trend_adx, strong_trend_adx, strong_momentum_slope)` per §4.4.
    pub fn trend_thresholds(&self) -> (f64, f64, f64) {
        match self {
            ModeProfile::MacroSurveillance => (25.0, 35.0, 3.0),
            ModeProfile::StealthBalanced => (20.0, 30.0, 2.0),
            ModeProfile::IntradayAggressive => (15.0, 25.0, 1.5),
            ModeProfile::Precision => (12.0, 20.0, 1.0),
        }
    }

    /// Minimum confluence score (0-100) a candidate must clear before the risk
    /// and cooldown gates even run (§4.7). Tighter modes demand more agreement.
    pub fn min_confluence_score(&self) -> f64 {
        match self {
            ModeProfile::MacroSurveillance => 55.0,
            ModeProfile::StealthBalanced => 62.0,
            ModeProfile::IntradayAggressive => 68.0,
            ModeProfile::Precision => 75.0,
        }
    }
}

impl std::fmt::Display for ModeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModeProfile::MacroSurveillance => "macro_surveillance",
            ModeProfile::StealthBalanced => "stealth_balanced",
            ModeProfile::IntradayAggressive => "intraday_aggressive",
            ModeProfile::Precision => "precision",
        };
        write!(f, "{s}")
    }
}

/// Process-wide configuration, read once at startup from the environment (§6, §2.1).
/// Validation failures are `InvalidConfig` and are fatal.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub exchange: Option<String>,
    pub cache_dir: std::path::PathBuf,
    pub coingecko_api_key: Option<String>,
    pub cryptocompare_api_key: Option<String>,
    pub max_workers: usize,
    pub log_level: String,
    pub adapter_deadline: Duration,
}

impl ScanConfig {
    /// Loads from the process environment, optionally merging a `.env` file first.
    /// `MAX_WORKERS` must parse as a positive integer; anything else is `InvalidConfig`.
    pub fn from_env() -> Result<Self, ScanError> {
        let _ = dotenvy::dotenv();

        let max_workers = match std::env::var("MAX_WORKERS") {
            Ok(raw) => raw
                .parse::<usize>()
                .map_err(|_| ScanError::InvalidConfig(format!("MAX_WORKERS not a positive integer: {raw}")))
                .and_then(|n| {
                    if n == 0 {
                        Err(ScanError::InvalidConfig("MAX_WORKERS must be > 0".into()))
                    } else {
                        Ok(n)
                    }
                })?,
            Err(_) => 4,
        };

        Ok(ScanConfig {
            exchange: std::env::var("EXCHANGE").ok(),
            cache_dir: std::env::var("CACHE_DIR").unwrap_or_else(|_| "./cache".to_string()).into(),
            coingecko_api_key: std::env::var("COINGECKO_API_KEY").ok(),
            cryptocompare_api_key: std::env::var("CRYPTOCOMPARE_API_KEY").ok(),
            max_workers,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            adapter_deadline: Duration::from_secs(10),
        })
    }
}
