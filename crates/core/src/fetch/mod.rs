//! Batch fetching.
//!
//! - [`planning`] - Pure cache-hit / fetch-window decision
//! - [`report`] - `FailureReport`, `FetchTask`, `BatchOutcome`
//! - [`orchestrator`] - `FetchOrchestrator`, the two-pass bounded batch runner

pub mod orchestrator;
pub mod planning;
pub mod report;


pub use orchestrator::{normalize_symbols, FetchOrchestrator, OrchestratorConfig};
pub use planning::{plan_symbol, FetchDecision, PlanContext};
pub use report::{
    BatchOutcome, FailureCategory, FailureEntry, FailureReport, FetchTask, SymbolOutcome,
};
