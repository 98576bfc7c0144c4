//! Simulated progress ticker.
//!
//! One task per in-flight render advances its progress bar on a fixed
//! tick, derived purely from elapsed time over the reveal window. Real
//! provider progress still merges through the table; the simulation
//! only ever raises the value, so whichever source is further ahead
//! wins.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reelgen_core::render::{simulated_progress, RenderStatus};

use crate::config::Config;
use crate::events::{EventBus, OrchestratorEvent};
use crate::table::RenderTable;
use crate::now_ms;

use std::sync::Arc;

/// Spawn the ticker for one render. The task ends on its own when the
/// render leaves the table, turns terminal, or outlives its hard stop.
pub fn spawn_progress_ticker(
    table: RenderTable,
    events: Arc<EventBus>,
    local_key: String,
    config: Config,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(config.progress_tick);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick of `interval` fires immediately.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => {}
            }

            let Some(render) = table.get(&local_key).await else {
                return;
            };
            if render.status != RenderStatus::Pending {
                return;
            }

            let now = now_ms();
            let window = render.min_ready_at - render.started_at;
            // Safety valve for a poller that died: stop simulating well
            // past the window rather than ticking forever.
            let hard_stop = render.started_at + hard_stop_ms(window);
            if now >= hard_stop {
                tracing::debug!(local_key = %local_key, "progress ticker hit hard stop");
                return;
            }

            let simulated = simulated_progress(now - render.started_at, window);
            let changed = table
                .update(&local_key, |r| {
                    if simulated > r.progress {
                        r.progress = simulated;
                    }
                })
                .await
                .map(|r| r.progress == simulated)
                .unwrap_or(false);
            if changed {
                events.publish(OrchestratorEvent::RenderUpdated {
                    local_key: local_key.clone(),
                });
            }
        }
    })
}

/// How long past its start a render keeps ticking before the simulator
/// gives up: half again the reveal window, and at least 15s beyond it.
fn hard_stop_ms(window_ms: i64) -> i64 {
    ((window_ms as f64 * 1.5) as i64).max(window_ms + 15_000)
}
