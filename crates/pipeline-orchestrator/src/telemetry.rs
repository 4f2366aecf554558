//! Append-only telemetry sink (§4.7). Not a message-queue integration — a
//! `Vec` behind a lock plus a `tracing` event per item, queryable by `run_id`
//! for the job facade. Sequence numbers are assigned at emit time and are
//! monotonic across the whole process, not per-run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use confluence_scorer::ScoreTrace;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    ScanStarted { run_id: Uuid, params: Value },
    SymbolStarted { run_id: Uuid, symbol: String },
    SignalGenerated { run_id: Uuid, symbol: String, trace: Box<ScoreTrace> },
    SignalRejected { run_id: Uuid, symbol: String, stage: String, reason: String, diagnostics: Value },
    ScanCompleted { run_id: Uuid, scanned: usize, signals: usize, rejected: usize, duration_ms: u64 },
}

impl TelemetryEvent {
    fn run_id(&self) -> Uuid {
        match self {
            TelemetryEvent::ScanStarted { run_id, .. }
            | TelemetryEvent::SymbolStarted { run_id, .. }
            | TelemetryEvent::SignalGenerated { run_id, .. }
            | TelemetryEvent::SignalRejected { run_id, .. }
            | TelemetryEvent::ScanCompleted { run_id, .. } => *run_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    pub sequence: u64,
    pub event: TelemetryEvent,
}

#[derive(Default)]
pub struct TelemetrySink {
    next_sequence: AtomicU64,
    log: Mutex<Vec<TelemetryRecord>>,
}

impl TelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: TelemetryEvent) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        tracing::info!(sequence, run_id = %event.run_id(), "{:?}", event);
        self.log.lock().unwrap().push(TelemetryRecord { sequence, event });
    }

    pub fn events_for(&self, run_id: Uuid) -> Vec<TelemetryRecord> {
        self.log.lock().unwrap().iter().filter(|r| r.event.run_id() == run_id).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic_and_shared_across_runs() {
        let sink = TelemetrySink::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        sink.emit(TelemetryEvent::ScanStarted { run_id: run_a, params: serde_json::json!({}) });
        sink.emit(TelemetryEvent::ScanStarted { run_id: run_b, params: serde_json::json!({}) });
        sink.emit(TelemetryEvent::SymbolStarted { run_id: run_a, symbol: "BTC/USDT".into() });

        let events_a = sink.events_for(run_a);
        assert_eq!(events_a.len(), 2);
        assert!(events_a[0].sequence < events_a[1].sequence);
    }

    #[test]
    fn events_for_filters_by_run_id() {
        let sink = TelemetrySink::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        sink.emit(TelemetryEvent::ScanStarted { run_id: run_a, params: serde_json::json!({}) });
        sink.emit(TelemetryEvent::ScanStarted { run_id: run_b, params: serde_json::json!({}) });
        assert_eq!(sink.events_for(run_b).len(), 1);
    }
}
