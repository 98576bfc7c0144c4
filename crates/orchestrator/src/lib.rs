//! Generation session orchestrator.
//!
//! Owns the optimistic render table and drives every background task a
//! submission needs: simulated progress ticking, status polling with
//! silent retry, reveal-gate release, and scoped persistence. Consumers
//! observe state through broadcast events and table snapshots.

pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
mod poll;
pub mod preflight;
pub mod progress;
pub mod table;
pub mod topup;

pub use config::Config;
pub use error::OrchestratorError;
pub use events::OrchestratorEvent;
pub use orchestrator::Orchestrator;
pub use topup::TopUpPrompt;

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
