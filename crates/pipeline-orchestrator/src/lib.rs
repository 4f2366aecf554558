//! Wires the independently-built analysis crates into the staged per-symbol
//! scan pipeline and exposes it as an async job facade (§4.7).

pub mod job;
pub mod orchestrator;
pub mod telemetry;

pub use job::{Job, JobState, JobStatus, Rejection, RejectionSummary, ScanParams, Signal};
pub use orchestrator::{OrchestratorConfig, ScanOrchestrator};
pub use telemetry::{TelemetryEvent, TelemetryRecord, TelemetrySink};
