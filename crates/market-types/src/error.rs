use thiserror::Error;

/// Error taxonomy shared across the scan pipeline (§7). Every library crate in the
/// workspace maps its failures onto one of these kinds so the orchestrator can decide,
/// without inspecting crate-specific types, whether to reject-and-continue or abort.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("bad OHLCV: {0}")]
    BadOhlcv(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network transient error: {0}")]
    NetworkTransient(String),

    #[error("risk rejected: {0}")]
    RiskRejected(String),

    #[error("cooldown active until {expires_at}: {reason}")]
    CooldownActive {
        expires_at: chrono::DateTime<chrono::Utc>,
        reason: String,
    },

    #[error("scorer blocked: {0}")]
    ScorerBlocked(String),

    #[error("cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ScanError {
    /// Stable reason string used in `rejections.by_reason` telemetry.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ScanError::DataUnavailable(_) => "DataUnavailable",
            ScanError::BadOhlcv(_) => "BadOHLCV",
            ScanError::InsufficientData(_) => "InsufficientData",
            ScanError::InvalidConfig(_) => "InvalidConfig",
            ScanError::RateLimited(_) => "RateLimited",
            ScanError::NetworkTransient(_) => "NetworkTransient",
            ScanError::RiskRejected(_) => "RiskRejected",
            ScanError::CooldownActive { .. } => "CooldownActive",
            ScanError::ScorerBlocked(_) => "ScorerBlocked",
            ScanError::Cancelled => "Cancelled",
            ScanError::InvalidArgument(_) => "InvalidArgument",
            ScanError::InternalError(_) => "InternalError",
        }
    }
}
