//! The scan job facade (§4.7): `create_scan`, `get_job`, `cancel`, and the
//! worker pool that drives each symbol through the staged pipeline —
//! ingest -> indicators/SMC -> swing + regime + cycle -> scorer -> HTF gate ->
//! threshold -> risk gate -> cooldown gate -> emit.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use confluence_scorer::{FactorInputs, HtfProximity, ScoreTrace, Verdict};
use cooldown_store::CooldownStore;
use cycle_detector::{detect_symbol_cycles, four_year_cycle_context, CycleBias};
use exchange_adapter::ExchangeAdapter;
use futures_util::stream::{self, StreamExt};
use indicator_contract::{IndicatorEngine, IndicatorSet, ReferenceIndicatorEngine, ReferenceSmcEngine, SmcPatternEngine};
use market_regime_detector::{dominance, CycleZoneHint, DominanceInputs, MarketRegime, RegimeDetector};
use market_types::{Bar, Direction, ModeProfile, ScanError, Timeframe};
use position_sizer::PositionSizer;
use risk_manager::RiskManager;
use swing_structure::compute_swing_structure;
use unified_cache::UnifiedCache;
use uuid::Uuid;

use crate::job::{Job, JobState, JobStatus, Rejection, ScanParams, Signal};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

const PIPELINE_TIMEFRAMES: [Timeframe; 3] = [Timeframe::H1, Timeframe::H4, Timeframe::D1];
const MIN_BARS: usize = 220;
const PRIMARY_HTF: Timeframe = Timeframe::H4;
const EXECUTION_TF: Timeframe = Timeframe::H1;
const SWING_LOOKBACK: usize = 10;
const MIN_SWING_ATR: f64 = 0.5;
const DEFAULT_RISK_PCT: f64 = 2.0;
const ATR_STOP_MULTIPLIER: f64 = 2.0;
const HTF_PROXIMITY_LOOKBACK: usize = 50;

pub struct OrchestratorConfig {
    pub max_workers: usize,
    /// Symbol whose regime stands in for the whole market (§4.4's "global" regime).
    pub anchor_symbol: String,
    pub dominance_cache_path: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            anchor_symbol: "BTC/USDT".to_string(),
            dominance_cache_path: PathBuf::from("./cache/dominance_cache.json"),
        }
    }
}

enum Outcome {
    Signal(Signal),
    Rejected(Rejection, &'static str),
    Abandoned,
}

fn reject(symbol: &str, direction: Option<Direction>, stage: &'static str, err: ScanError) -> Outcome {
    Outcome::Rejected(Rejection { symbol: symbol.to_string(), direction, stage, reason: err.to_string() }, err.reason_code())
}

pub struct ScanOrchestrator {
    adapter: Arc<dyn ExchangeAdapter>,
    indicator_engine: Arc<ReferenceIndicatorEngine>,
    smc_engine: Arc<ReferenceSmcEngine>,
    risk_manager: Arc<RiskManager>,
    cooldown_store: Arc<CooldownStore>,
    position_sizer: PositionSizer,
    telemetry: Arc<TelemetrySink>,
    config: OrchestratorConfig,
    global_regime_detector: Mutex<RegimeDetector>,
    symbol_regime_detectors: Mutex<HashMap<String, RegimeDetector>>,
    jobs: Mutex<HashMap<Uuid, Arc<JobState>>>,
}

impl ScanOrchestrator {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        risk_manager: Arc<RiskManager>,
        cooldown_store: Arc<CooldownStore>,
        position_sizer: PositionSizer,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            adapter,
            indicator_engine: Arc::new(ReferenceIndicatorEngine),
            smc_engine: Arc::new(ReferenceSmcEngine),
            risk_manager,
            cooldown_store,
            position_sizer,
            telemetry: Arc::new(TelemetrySink::new()),
            config,
            global_regime_detector: Mutex::new(RegimeDetector::new()),
            symbol_regime_detectors: Mutex::new(HashMap::new()),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn telemetry(&self) -> &TelemetrySink {
        &self.telemetry
    }

    /// Starts a scan in the background and returns immediately with its
    /// `run_id` and the job's initial (`pending`) snapshot.
    pub fn create_scan(self: &Arc<Self>, params: ScanParams) -> (Uuid, Job) {
        let run_id = Uuid::new_v4();
        let total = params.symbols.as_ref().map(|s| s.len()).unwrap_or(0);
        let state = Arc::new(JobState::new(run_id, total));
        self.jobs.lock().unwrap().insert(run_id, Arc::clone(&state));

        let orchestrator = Arc::clone(self);
        let snapshot = state.snapshot();
        tokio::spawn(async move {
            orchestrator.run_scan(run_id, params, state).await;
        });

        (run_id, snapshot)
    }

    pub fn get_job(&self, run_id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&run_id).map(|s| s.snapshot())
    }

    /// Sets the cancellation flag. Returns `false` if the job is unknown or
    /// already in a terminal state.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.jobs.lock().unwrap().get(&run_id) {
            Some(state) => state.request_cancel(),
            None => false,
        }
    }

    async fn run_scan(self: Arc<Self>, run_id: Uuid, params: ScanParams, state: Arc<JobState>) {
        let start = Instant::now();
        state.set_running();
        self.telemetry.emit(TelemetryEvent::ScanStarted {
            run_id,
            params: serde_json::json!({
                "mode_profile": params.mode_profile.to_string(),
                "leverage": params.leverage,
                "min_score": params.min_score,
            }),
        });

        let symbols = match self.resolve_symbols(&params).await {
            Ok(symbols) => symbols,
            Err(e) => {
                state.finish(JobStatus::Failed, Some(e.to_string()));
                return;
            }
        };
        state.set_total(symbols.len());

        let cache = UnifiedCache::global();
        let dominance_inputs = self.dominance_inputs();

        let global_regime = match self.compute_global_regime(cache, params.mode_profile, dominance_inputs).await {
            Ok(r) => Arc::new(r),
            Err(e) => {
                state.finish(JobStatus::Failed, Some(format!("global regime unavailable: {e}")));
                return;
            }
        };

        let min_score = params.min_score.unwrap_or_else(|| params.mode_profile.min_confluence_score());

        stream::iter(symbols)
            .map(|symbol| {
                let orchestrator = Arc::clone(&self);
                let state = Arc::clone(&state);
                let global_regime = Arc::clone(&global_regime);
                let mode = params.mode_profile;
                let leverage = params.leverage;
                async move {
                    if state.is_cancelled() {
                        return;
                    }
                    state.set_current_symbol(Some(symbol.clone()));
                    orchestrator.telemetry.emit(TelemetryEvent::SymbolStarted { run_id, symbol: symbol.clone() });

                    let outcome = orchestrator
                        .process_symbol(&symbol, mode, leverage, min_score, cache, dominance_inputs, &global_regime, &state)
                        .await;

                    match outcome {
                        Outcome::Signal(signal) => {
                            orchestrator.telemetry.emit(TelemetryEvent::SignalGenerated {
                                run_id,
                                symbol: symbol.clone(),
                                trace: Box::new(signal.trace.clone()),
                            });
                            state.push_signal(signal);
                        }
                        Outcome::Rejected(rejection, reason_code) => {
                            orchestrator.telemetry.emit(TelemetryEvent::SignalRejected {
                                run_id,
                                symbol: symbol.clone(),
                                stage: rejection.stage.to_string(),
                                reason: rejection.reason.clone(),
                                diagnostics: serde_json::json!({ "direction": rejection.direction }),
                            });
                            state.push_rejection(rejection, reason_code);
                        }
                        Outcome::Abandoned => {}
                    }
                }
            })
            .buffer_unordered(self.config.max_workers.max(1))
            .collect::<Vec<()>>()
            .await;

        let snapshot = state.snapshot();
        let final_status = if state.is_cancelled() { JobStatus::Cancelled } else { JobStatus::Completed };
        state.finish(final_status, None);

        self.telemetry.emit(TelemetryEvent::ScanCompleted {
            run_id,
            scanned: snapshot.progress,
            signals: snapshot.signals.len(),
            rejected: snapshot.rejections.total,
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }

    async fn resolve_symbols(&self, params: &ScanParams) -> Result<Vec<String>, ScanError> {
        if let Some(symbols) = &params.symbols {
            return Ok(symbols.clone());
        }
        let limit = params.limit.unwrap_or(20);
        self.adapter.list_top_symbols(limit, "USDT").await
    }

    fn dominance_inputs(&self) -> DominanceInputs {
        dominance::load_cache(&self.config.dominance_cache_path).map(DominanceInputs::from).unwrap_or_default()
    }

    async fn compute_global_regime(&self, cache: &UnifiedCache, mode: ModeProfile, dominance: DominanceInputs) -> Result<MarketRegime, ScanError> {
        let req = mtf_ingest::IngestRequest {
            symbol: &self.config.anchor_symbol,
            timeframes: &PIPELINE_TIMEFRAMES,
            min_bars: MIN_BARS,
            primary_htf: PRIMARY_HTF,
        };
        let bundle = mtf_ingest::assemble_bundle(self.adapter.as_ref(), cache, req).await?;
        let bars = bundle
            .get(PRIMARY_HTF)
            .ok_or_else(|| ScanError::DataUnavailable(format!("anchor symbol {} missing {PRIMARY_HTF} bars", self.config.anchor_symbol)))?;

        let mut detector = self.global_regime_detector.lock().unwrap();
        market_regime_detector::global_regime_cached(&mut detector, cache, bars, mode, dominance)
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_symbol(
        &self,
        symbol: &str,
        mode: ModeProfile,
        leverage: f64,
        min_score: f64,
        cache: &UnifiedCache,
        dominance: DominanceInputs,
        global_regime: &MarketRegime,
        state: &JobState,
    ) -> Outcome {
        macro_rules! abandon_if_cancelled {
            () => {
                if state.is_cancelled() {
                    return Outcome::Abandoned;
                }
            };
        }

        let req = mtf_ingest::IngestRequest { symbol, timeframes: &PIPELINE_TIMEFRAMES, min_bars: MIN_BARS, primary_htf: PRIMARY_HTF };
        let bundle = match mtf_ingest::assemble_bundle(self.adapter.as_ref(), cache, req).await {
            Ok(bundle) => bundle,
            Err(e) => return reject(symbol, None, "ingest", e),
        };

        abandon_if_cancelled!();

        let execution_bars = match bundle.get(EXECUTION_TF) {
            Some(bars) => bars,
            None => return reject(symbol, None, "ingest", ScanError::DataUnavailable(format!("{symbol}: no {EXECUTION_TF} bars"))),
        };

        let indicators = match self.indicator_engine.compute(execution_bars) {
            Ok(set) => set,
            Err(e) => return reject(symbol, None, "indicators", e),
        };
        let order_blocks = self.smc_engine.detect_order_blocks(execution_bars).unwrap_or_default();
        let fair_value_gaps = self.smc_engine.detect_fvgs(execution_bars).unwrap_or_default();
        let liquidity_sweeps = self.smc_engine.detect_liquidity_sweeps(execution_bars).unwrap_or_default();
        let structure_events = self.smc_engine.detect_bos_choch(execution_bars).unwrap_or_default();

        abandon_if_cancelled!();

        let swing = match compute_swing_structure(execution_bars, SWING_LOOKBACK, MIN_SWING_ATR) {
            Ok(s) => s,
            Err(e) => return reject(symbol, None, "swing", e),
        };

        let mut mtf_swings = HashMap::new();
        for tf in [Timeframe::H4, Timeframe::D1] {
            if let Some(bars) = bundle.get(tf) {
                if let Ok(structure) = compute_swing_structure(bars, SWING_LOOKBACK, MIN_SWING_ATR) {
                    mtf_swings.insert(tf, structure.trend);
                }
            }
        }

        let daily_bars = bundle.get(Timeframe::D1).unwrap_or(execution_bars);
        let cycle = match detect_symbol_cycles(symbol, daily_bars) {
            Ok(c) => c,
            Err(e) => return reject(symbol, None, "cycle", e),
        };
        let four_year = four_year_cycle_context(Utc::now());

        abandon_if_cancelled!();

        let cycle_hint = match cycle.overall_bias {
            CycleBias::Long => CycleZoneHint::Accumulation,
            CycleBias::Short => CycleZoneHint::Distribution,
            CycleBias::Neutral => CycleZoneHint::Neither,
        };

        let symbol_regime = match self.symbol_regime(symbol, daily_bars, cache, mode, dominance, cycle_hint) {
            Ok(r) => r,
            Err(e) => return reject(symbol, None, "regime", e),
        };

        let recent_volume_ratio = volume_ratio(execution_bars);
        let htf_proximity = htf_proximity(&indicators, execution_bars);

        abandon_if_cancelled!();

        let mut best: Option<(Direction, ScoreTrace)> = None;
        for direction in [Direction::Long, Direction::Short] {
            let inputs = FactorInputs {
                indicators: &indicators,
                order_blocks: &order_blocks,
                fair_value_gaps: &fair_value_gaps,
                liquidity_sweeps: &liquidity_sweeps,
                structure_events: &structure_events,
                swing: &swing,
                mtf_swings: &mtf_swings,
                global_regime,
                symbol_regime: &symbol_regime,
                cycle: &cycle,
                four_year: &four_year,
                recent_volume_ratio,
                htf_proximity,
            };
            let trace = confluence_scorer::score(symbol, direction, mode, &inputs);
            let better = best.as_ref().map(|(_, current)| trace.final_score > current.final_score).unwrap_or(true);
            if better {
                best = Some((direction, trace));
            }
        }
        let (direction, trace) = best.expect("two directions are always scored");

        if trace.verdict == Verdict::Blocked {
            return reject(symbol, Some(direction), "scorer", ScanError::ScorerBlocked(format!("{symbol} {direction:?}: HTF counter-trend")));
        }

        abandon_if_cancelled!();

        if trace.final_score < min_score {
            return Outcome::Rejected(
                Rejection {
                    symbol: symbol.to_string(),
                    direction: Some(direction),
                    stage: "threshold",
                    reason: format!("final_score {:.1} below minimum {:.1}", trace.final_score, min_score),
                },
                "BelowThreshold",
            );
        }

        let entry = execution_bars.last().unwrap().close;
        let atr = match indicators.atr {
            Some(atr) if atr > 0.0 => atr,
            _ => return reject(symbol, Some(direction), "sizing", ScanError::InsufficientData(format!("{symbol}: no ATR for position sizing"))),
        };
        let stop = match direction {
            Direction::Long => entry - atr * ATR_STOP_MULTIPLIER,
            Direction::Short => entry + atr * ATR_STOP_MULTIPLIER,
        };

        let position = match self.position_sizer.fixed_fractional(DEFAULT_RISK_PCT, entry, stop, leverage) {
            Ok(p) => p,
            Err(e) => return reject(symbol, Some(direction), "sizing", e),
        };

        abandon_if_cancelled!();

        let risk_check = self.risk_manager.validate_new_trade(symbol, direction, position.notional_value, position.risk_amount);
        if !risk_check.passed {
            return Outcome::Rejected(
                Rejection { symbol: symbol.to_string(), direction: Some(direction), stage: "risk", reason: risk_check.reason },
                "RiskRejected",
            );
        }

        if let Some(cooldown) = self.cooldown_store.is_active(symbol, direction) {
            return Outcome::Rejected(
                Rejection {
                    symbol: symbol.to_string(),
                    direction: Some(direction),
                    stage: "cooldown",
                    reason: format!("cooldown active until {} ({})", cooldown.expires_at, cooldown.reason),
                },
                "CooldownActive",
            );
        }

        Outcome::Signal(Signal { symbol: symbol.to_string(), direction, trace, position, generated_at: Utc::now() })
    }

    fn symbol_regime(
        &self,
        symbol: &str,
        bars: &[Bar],
        cache: &UnifiedCache,
        mode: ModeProfile,
        dominance: DominanceInputs,
        cycle_hint: CycleZoneHint,
    ) -> Result<MarketRegime, ScanError> {
        let mut detectors = self.symbol_regime_detectors.lock().unwrap();
        let detector = detectors.entry(symbol.to_string()).or_insert_with(RegimeDetector::new);
        market_regime_detector::symbol_regime_cached(detector, cache, symbol, bars, mode, dominance, cycle_hint)
    }
}

fn volume_ratio(bars: &[Bar]) -> f64 {
    if bars.len() < 20 {
        return 1.0;
    }
    let recent5: f64 = bars[bars.len() - 5..].iter().map(|b| b.volume).sum::<f64>() / 5.0;
    let recent20: f64 = bars[bars.len() - 20..].iter().map(|b| b.volume).sum::<f64>() / 20.0;
    if recent20 > 0.0 {
        recent5 / recent20
    } else {
        1.0
    }
}

/// How close (in ATR multiples) the latest close sits to the nearest extreme
/// among the last [`HTF_PROXIMITY_LOOKBACK`] bars — the scorer's stand-in for
/// "price is at a structural level" when deciding whether a counter-trend
/// setup earns `caution` instead of `blocked`.
fn htf_proximity(indicators: &IndicatorSet, bars: &[Bar]) -> Option<HtfProximity> {
    let atr = indicators.atr?;
    if atr <= 0.0 {
        return None;
    }
    let price = bars.last()?.close;
    let window = &bars[bars.len().saturating_sub(HTF_PROXIMITY_LOOKBACK)..];
    let nearest = window.iter().flat_map(|b| [(b.high - price).abs(), (b.low - price).abs()]).fold(f64::INFINITY, f64::min);
    if !nearest.is_finite() {
        return None;
    }
    Some(HtfProximity { valid: true, proximity_atr: nearest / atr })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use exchange_adapter::FakeAdapter;
    use risk_manager::RiskLimits;
    use std::time::Duration as StdDuration;
    use tempfile::TempDir;

    fn bars(tf: Timeframe, n: usize, start: f64, drift: f64) -> Vec<Bar> {
        let spacing = tf.seconds();
        (0..n)
            .map(|i| {
                let base = start + drift * i as f64;
                Bar {
                    timestamp: Utc.timestamp_opt(i as i64 * spacing, 0).unwrap(),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.2,
                    volume: 1_000.0 + (i % 7) as f64 * 10.0,
                }
            })
            .collect()
    }

    fn seeded_adapter(symbols: &[&str]) -> FakeAdapter {
        let mut adapter = FakeAdapter::new("fake");
        for &symbol in symbols {
            for tf in PIPELINE_TIMEFRAMES {
                adapter = adapter.with_bars(symbol, tf, bars(tf, MIN_BARS + 10, 100.0, 0.05));
            }
        }
        adapter
    }

    fn test_orchestrator(adapter: FakeAdapter, dir: &TempDir) -> Arc<ScanOrchestrator> {
        let risk_manager = Arc::new(RiskManager::new(10_000.0, RiskLimits::default()).unwrap());
        let cooldown_store = Arc::new(CooldownStore::load(dir.path().join("cooldowns.json")).unwrap());
        let position_sizer = PositionSizer::default_for_balance(10_000.0).unwrap();
        let config = OrchestratorConfig {
            max_workers: 2,
            anchor_symbol: "BTC/USDT".to_string(),
            dominance_cache_path: dir.path().join("dominance_cache.json"),
        };
        Arc::new(ScanOrchestrator::new(Arc::new(adapter), risk_manager, cooldown_store, position_sizer, config))
    }

    async fn wait_for_terminal(orchestrator: &Arc<ScanOrchestrator>, run_id: Uuid) -> Job {
        for _ in 0..200 {
            let job = orchestrator.get_job(run_id).unwrap();
            if matches!(job.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled) {
                return job;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        panic!("scan did not reach a terminal state in time");
    }

    fn params(symbols: Vec<&str>) -> ScanParams {
        ScanParams {
            symbols: Some(symbols.into_iter().map(String::from).collect()),
            limit: None,
            min_score: None,
            mode_profile: ModeProfile::StealthBalanced,
            leverage: 2.0,
            exchange: None,
        }
    }

    #[tokio::test]
    async fn cancel_before_first_poll_skips_all_symbols() {
        let dir = TempDir::new().unwrap();
        let adapter = seeded_adapter(&["BTC/USDT", "AAA/USDT", "BBB/USDT"]);
        let orchestrator = test_orchestrator(adapter, &dir);

        let (run_id, job) = orchestrator.create_scan(params(vec!["AAA/USDT", "BBB/USDT"]));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(orchestrator.cancel(run_id));

        let job = wait_for_terminal(&orchestrator, run_id).await;
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.signals.len(), 0);
        assert_eq!(job.rejections.total, 0);
    }

    #[tokio::test]
    async fn cancelling_an_unknown_job_reports_false() {
        let dir = TempDir::new().unwrap();
        let orchestrator = test_orchestrator(seeded_adapter(&["BTC/USDT"]), &dir);
        assert!(!orchestrator.cancel(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn full_scan_accounts_for_every_symbol() {
        let dir = TempDir::new().unwrap();
        let adapter = seeded_adapter(&["BTC/USDT", "AAA/USDT", "BBB/USDT"]);
        let orchestrator = test_orchestrator(adapter, &dir);

        let (run_id, _) = orchestrator.create_scan(params(vec!["AAA/USDT", "BBB/USDT"]));
        let job = wait_for_terminal(&orchestrator, run_id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total, 2);
        assert_eq!(job.progress, 2);
        assert_eq!(job.signals.len() + job.rejections.total, 2);

        let events = orchestrator.telemetry().events_for(run_id);
        assert!(events.iter().any(|e| matches!(e.event, TelemetryEvent::ScanStarted { .. })));
        let scanned = events.iter().find_map(|e| match &e.event {
            TelemetryEvent::ScanCompleted { scanned, .. } => Some(*scanned),
            _ => None,
        });
        assert_eq!(scanned, Some(2));
    }

    #[tokio::test]
    async fn missing_anchor_bars_fails_the_whole_scan() {
        let dir = TempDir::new().unwrap();
        let adapter = seeded_adapter(&["AAA/USDT"]);
        let orchestrator = test_orchestrator(adapter, &dir);

        let (run_id, _) = orchestrator.create_scan(params(vec!["AAA/USDT"]));
        let job = wait_for_terminal(&orchestrator, run_id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.is_some());
    }

    #[tokio::test]
    async fn unspecified_symbols_fall_back_to_adapter_top_list() {
        let dir = TempDir::new().unwrap();
        let mut adapter = seeded_adapter(&["BTC/USDT", "AAA/USDT"]);
        adapter.top_symbols = vec!["AAA/USDT".to_string()];
        let orchestrator = test_orchestrator(adapter, &dir);

        let request = ScanParams { symbols: None, limit: Some(1), min_score: None, mode_profile: ModeProfile::StealthBalanced, leverage: 2.0, exchange: None };
        let resolved = orchestrator.resolve_symbols(&request).await.unwrap();
        assert_eq!(resolved, vec!["AAA/USDT".to_string()]);
    }

    #[test]
    fn volume_ratio_flat_series_is_one() {
        let b = bars(Timeframe::H1, 25, 100.0, 0.0);
        assert!((volume_ratio(&b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn volume_ratio_short_series_defaults_to_one() {
        let b = bars(Timeframe::H1, 10, 100.0, 0.0);
        assert_eq!(volume_ratio(&b), 1.0);
    }

    fn empty_indicator_set(atr: Option<f64>) -> IndicatorSet {
        IndicatorSet {
            atr,
            atr_series: atr.map(|a| vec![a; 5]).unwrap_or_default(),
            bb_upper: None,
            bb_middle: None,
            bb_lower: None,
            kc_upper: None,
            kc_lower: None,
            ttm_squeeze_on: false,
            ttm_squeeze_firing: false,
            rsi: None,
            macd_histogram: None,
        }
    }

    #[test]
    fn htf_proximity_missing_atr_is_none() {
        let indicators = empty_indicator_set(None);
        let b = bars(Timeframe::H1, 10, 100.0, 0.0);
        assert!(htf_proximity(&indicators, &b).is_none());
    }

    #[test]
    fn htf_proximity_reports_distance_in_atr_multiples() {
        let indicators = empty_indicator_set(Some(2.0));
        let b = bars(Timeframe::H1, 10, 100.0, 0.0);
        let proximity = htf_proximity(&indicators, &b).unwrap();
        assert!(proximity.valid);
        assert!(proximity.proximity_atr >= 0.0);
    }
}
