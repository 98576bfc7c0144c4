//! Orchestrator timing configuration.

use std::time::Duration;

use reelgen_core::render::{DEFAULT_ETA_FLOOR_SECS, DEFAULT_REVEAL_FLOOR_MS};

/// Cadences and floors for the background tasks.
///
/// Defaults match production behavior; tests compress them so a full
/// submission lifecycle runs in milliseconds.
#[derive(Debug, Clone)]
pub struct Config {
    /// How often simulated progress advances.
    pub progress_tick: Duration,
    /// Delay before the first status poll of a job.
    pub first_poll_delay: Duration,
    /// Delay between subsequent status polls.
    pub poll_interval: Duration,
    /// Delay before retrying after a failed poll.
    pub poll_retry_delay: Duration,
    /// Poll cadence once a job reports completed but its media URL has
    /// not appeared yet.
    pub media_poll_interval: Duration,
    /// Debounce applied to preflight price quotes.
    pub preflight_debounce: Duration,
    /// Lower bound on the reveal window, in milliseconds.
    pub reveal_floor_ms: i64,
    /// Lower bound applied to the ETA before it becomes the reveal
    /// window, in seconds.
    pub eta_floor_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            progress_tick: Duration::from_millis(400),
            first_poll_delay: Duration::from_millis(1_500),
            poll_interval: Duration::from_millis(2_000),
            poll_retry_delay: Duration::from_millis(3_000),
            media_poll_interval: Duration::from_millis(4_000),
            preflight_debounce: Duration::from_millis(300),
            reveal_floor_ms: DEFAULT_REVEAL_FLOOR_MS,
            eta_floor_secs: DEFAULT_ETA_FLOOR_SECS,
        }
    }
}
