//! Local render records and the reveal-gate state machine.
//!
//! A render is inserted optimistically the moment a submission starts,
//! before the provider has assigned a job id. Every record carries a
//! reveal window derived from the engine's ETA: provider results that
//! arrive inside the window are stashed rather than shown, so a render
//! never flashes from "just started" to "done" in under the minimum
//! display time. Failures bypass the gate.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Reveal-gate constants
// ---------------------------------------------------------------------------

/// Default lower bound on the reveal window, in milliseconds.
pub const DEFAULT_REVEAL_FLOOR_MS: i64 = 2_000;
/// Default lower bound applied to the ETA before scaling to milliseconds.
pub const DEFAULT_ETA_FLOOR_SECS: i64 = 20;

/// Progress floor shown while a render is in flight.
pub const PROGRESS_FLOOR: u8 = 5;
/// Progress ceiling shown while the reveal gate holds a result back.
pub const PROGRESS_CEILING: u8 = 95;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a local render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Pending,
    Completed,
    Failed,
}

impl RenderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a provider status string. Unrecognised values are treated
    /// as still pending rather than surfaced as an error state.
    pub fn parse(s: &str) -> Self {
        match s {
            "completed" | "succeeded" | "done" => Self::Completed,
            "failed" | "error" | "canceled" | "cancelled" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Local render record
// ---------------------------------------------------------------------------

/// One optimistic render record, keyed by a client-generated `local_key`
/// that exists before the provider assigns a `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRender {
    pub local_key: String,
    /// Provider-side job id, once known.
    pub job_id: Option<String>,
    /// Client-generated id shared by all iterations of one submission.
    pub batch_id: String,
    /// Provider-side group id shared by sibling iterations, once known.
    pub group_id: Option<String>,
    pub iteration_index: u32,
    pub iteration_count: u32,
    pub engine_id: String,
    pub engine_label: String,
    pub prompt: String,
    pub aspect_ratio: Option<String>,
    pub duration_sec: u32,
    pub status: RenderStatus,
    pub progress: u8,
    pub message: Option<String>,
    /// Shown video, set only once the reveal gate has released.
    pub video_url: Option<String>,
    /// Video that arrived before the gate opened, held for release.
    pub ready_video_url: Option<String>,
    pub thumb_url: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
    pub eta_seconds: Option<u32>,
    pub eta_label: Option<String>,
    /// Epoch milliseconds when the submission started.
    pub started_at: i64,
    /// Epoch milliseconds before which a success may not be shown.
    pub min_ready_at: i64,
    /// Epoch milliseconds used for newest-first ordering.
    pub created_at: i64,
}

impl LocalRender {
    /// Whether the reveal gate is still holding this render back.
    pub fn gating_active(&self, now_ms: i64) -> bool {
        self.status == RenderStatus::Pending && now_ms < self.min_ready_at
    }

    /// Whether a finished result is waiting for the gate to open.
    pub fn has_held_result(&self) -> bool {
        self.status == RenderStatus::Pending && self.ready_video_url.is_some()
    }
}

// ---------------------------------------------------------------------------
// Reveal window
// ---------------------------------------------------------------------------

/// Minimum display time for a render, derived from its ETA.
///
/// The ETA is floored before scaling so very fast engines still hold
/// results long enough to read, and the whole window is floored again
/// in milliseconds.
pub fn min_duration_ms(eta_secs: Option<u32>, floor_ms: i64, eta_floor_secs: i64) -> i64 {
    let eta = eta_secs.map(i64::from).unwrap_or(0).max(eta_floor_secs);
    (eta * 1_000).max(floor_ms)
}

/// Simulated progress for an in-flight render.
///
/// Linear in elapsed time over the reveal window, clamped so the bar
/// never starts at zero and never reaches completion on its own.
pub fn simulated_progress(elapsed_ms: i64, min_duration_ms: i64) -> u8 {
    if min_duration_ms <= 0 {
        return PROGRESS_CEILING;
    }
    let pct = (elapsed_ms as f64 / min_duration_ms as f64 * 100.0).round();
    let pct = pct.clamp(PROGRESS_FLOOR as f64, PROGRESS_CEILING as f64);
    pct as u8
}

// ---------------------------------------------------------------------------
// Status patches
// ---------------------------------------------------------------------------

/// Fields a provider status response can update on a local render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPatch {
    pub job_id: Option<String>,
    pub group_id: Option<String>,
    pub iteration_index: Option<u32>,
    pub iteration_count: Option<u32>,
    pub status: Option<RenderStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub video_url: Option<String>,
    pub thumb_url: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
    pub eta_seconds: Option<u32>,
    pub eta_label: Option<String>,
}

impl LocalRender {
    /// Merge a provider patch, honouring the reveal gate.
    ///
    /// While the gate is active a reported success is downgraded: the
    /// video lands in `ready_video_url`, status stays `Pending`, and
    /// reported progress is capped at the ceiling. Failures always pass
    /// through. Identity fields merge regardless of gating.
    pub fn apply_patch(&mut self, patch: &RenderPatch, now_ms: i64) {
        if let Some(job_id) = &patch.job_id {
            self.job_id = Some(job_id.clone());
        }
        if let Some(group_id) = &patch.group_id {
            self.group_id = Some(group_id.clone());
        }
        if let Some(index) = patch.iteration_index {
            self.iteration_index = index;
        }
        if let Some(count) = patch.iteration_count {
            self.iteration_count = count;
        }
        if let Some(thumb) = &patch.thumb_url {
            self.thumb_url = Some(thumb.clone());
        }
        if let Some(cents) = patch.price_cents {
            self.price_cents = Some(cents);
        }
        if let Some(currency) = &patch.currency {
            self.currency = Some(currency.clone());
        }
        if let Some(payment) = &patch.payment_status {
            self.payment_status = Some(payment.clone());
        }
        if let Some(eta) = patch.eta_seconds {
            self.eta_seconds = Some(eta);
        }
        if let Some(label) = &patch.eta_label {
            self.eta_label = Some(label.clone());
        }
        if let Some(message) = &patch.message {
            self.message = Some(message.clone());
        }

        let gated = self.gating_active(now_ms);
        if let Some(url) = &patch.video_url {
            if gated {
                self.ready_video_url = Some(url.clone());
            } else {
                self.video_url = Some(url.clone());
            }
        }

        match patch.status {
            Some(RenderStatus::Failed) => {
                // Failures bypass the gate entirely.
                self.status = RenderStatus::Failed;
                if let Some(p) = patch.progress {
                    self.progress = p;
                }
            }
            Some(RenderStatus::Completed) => {
                if gated {
                    self.status = RenderStatus::Pending;
                    self.progress = patch.progress.unwrap_or(100).min(PROGRESS_CEILING);
                } else {
                    self.status = RenderStatus::Completed;
                    self.progress = 100;
                    if self.video_url.is_none() {
                        self.video_url = self.ready_video_url.take();
                    }
                }
            }
            Some(RenderStatus::Pending) | None => {
                // Reported progress only ever raises the bar, so a poll
                // can never drag it back below the simulated value.
                if let Some(p) = patch.progress {
                    let p = if gated { p.min(PROGRESS_CEILING) } else { p };
                    self.progress = self.progress.max(p);
                }
            }
        }
    }

    /// Release a held result once the gate has opened.
    ///
    /// Moves `ready_video_url` into `video_url`, flips status to
    /// `Completed`, and sets progress to 100 in one step so observers
    /// never see a completed render without its video. Returns whether
    /// a release happened.
    pub fn release_if_due(&mut self, now_ms: i64) -> bool {
        if self.status != RenderStatus::Pending || now_ms < self.min_ready_at {
            return false;
        }
        let Some(url) = self.ready_video_url.take() else {
            return false;
        };
        self.video_url = Some(url);
        self.status = RenderStatus::Completed;
        self.progress = 100;
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn render(started_at: i64, min_ready_at: i64) -> LocalRender {
        LocalRender {
            local_key: "lk-1".to_string(),
            job_id: None,
            batch_id: "batch-1".to_string(),
            group_id: None,
            iteration_index: 0,
            iteration_count: 1,
            engine_id: "engine-a".to_string(),
            engine_label: "Engine A".to_string(),
            prompt: "a quiet harbor at dawn".to_string(),
            aspect_ratio: Some("16:9".to_string()),
            duration_sec: 5,
            status: RenderStatus::Pending,
            progress: PROGRESS_FLOOR,
            message: None,
            video_url: None,
            ready_video_url: None,
            thumb_url: None,
            price_cents: None,
            currency: None,
            payment_status: None,
            eta_seconds: Some(20),
            eta_label: None,
            started_at,
            min_ready_at,
            created_at: started_at,
        }
    }

    // -- status parsing --

    #[test]
    fn unknown_status_strings_stay_pending() {
        assert_eq!(RenderStatus::parse("queued"), RenderStatus::Pending);
        assert_eq!(RenderStatus::parse(""), RenderStatus::Pending);
        assert_eq!(RenderStatus::parse("processing"), RenderStatus::Pending);
    }

    #[test]
    fn terminal_status_strings_parse() {
        assert_eq!(RenderStatus::parse("completed"), RenderStatus::Completed);
        assert_eq!(RenderStatus::parse("failed"), RenderStatus::Failed);
        assert_eq!(RenderStatus::parse("cancelled"), RenderStatus::Failed);
    }

    // -- reveal window --

    #[test]
    fn window_floors_eta_at_twenty_seconds() {
        let ms = min_duration_ms(Some(8), DEFAULT_REVEAL_FLOOR_MS, DEFAULT_ETA_FLOOR_SECS);
        assert_eq!(ms, 20_000);
    }

    #[test]
    fn window_uses_eta_above_the_floor() {
        let ms = min_duration_ms(Some(45), DEFAULT_REVEAL_FLOOR_MS, DEFAULT_ETA_FLOOR_SECS);
        assert_eq!(ms, 45_000);
    }

    #[test]
    fn missing_eta_still_gets_floored_window() {
        let ms = min_duration_ms(None, DEFAULT_REVEAL_FLOOR_MS, DEFAULT_ETA_FLOOR_SECS);
        assert_eq!(ms, 20_000);
    }

    #[test]
    fn absolute_floor_wins_when_eta_floor_is_tiny() {
        // Compressed floors as a timing-sensitive caller would configure.
        assert_eq!(min_duration_ms(Some(1), 2_000, 0), 2_000);
    }

    // -- simulated progress --

    #[test]
    fn progress_starts_at_floor() {
        assert_eq!(simulated_progress(0, 20_000), PROGRESS_FLOOR);
        assert_eq!(simulated_progress(200, 20_000), PROGRESS_FLOOR);
    }

    #[test]
    fn progress_is_linear_in_elapsed_time() {
        assert_eq!(simulated_progress(10_000, 20_000), 50);
        assert_eq!(simulated_progress(15_000, 20_000), 75);
    }

    #[test]
    fn progress_never_exceeds_ceiling() {
        assert_eq!(simulated_progress(19_500, 20_000), PROGRESS_CEILING);
        assert_eq!(simulated_progress(60_000, 20_000), PROGRESS_CEILING);
    }

    // -- gate-aware patching --

    #[test]
    fn early_success_is_held_not_shown() {
        let mut r = render(0, 20_000);
        let patch = RenderPatch {
            status: Some(RenderStatus::Completed),
            video_url: Some("https://cdn.example/v.mp4".to_string()),
            ..Default::default()
        };
        r.apply_patch(&patch, 5_000);
        assert_eq!(r.status, RenderStatus::Pending);
        assert!(r.video_url.is_none());
        assert_eq!(r.ready_video_url.as_deref(), Some("https://cdn.example/v.mp4"));
        assert!(r.progress <= PROGRESS_CEILING);
    }

    #[test]
    fn late_success_applies_directly() {
        let mut r = render(0, 20_000);
        let patch = RenderPatch {
            status: Some(RenderStatus::Completed),
            video_url: Some("https://cdn.example/v.mp4".to_string()),
            ..Default::default()
        };
        r.apply_patch(&patch, 25_000);
        assert_eq!(r.status, RenderStatus::Completed);
        assert_eq!(r.progress, 100);
        assert_eq!(r.video_url.as_deref(), Some("https://cdn.example/v.mp4"));
    }

    #[test]
    fn failure_bypasses_the_gate() {
        let mut r = render(0, 20_000);
        let patch = RenderPatch {
            status: Some(RenderStatus::Failed),
            message: Some("generation failed".to_string()),
            ..Default::default()
        };
        r.apply_patch(&patch, 1_000);
        assert_eq!(r.status, RenderStatus::Failed);
        assert_eq!(r.message.as_deref(), Some("generation failed"));
    }

    #[test]
    fn reported_progress_capped_while_gated() {
        let mut r = render(0, 20_000);
        let patch = RenderPatch {
            progress: Some(100),
            ..Default::default()
        };
        r.apply_patch(&patch, 5_000);
        assert_eq!(r.progress, PROGRESS_CEILING);
    }

    #[test]
    fn reported_progress_never_lowers_the_bar() {
        let mut r = render(0, 20_000);
        r.progress = 40;
        let patch = RenderPatch {
            progress: Some(10),
            ..Default::default()
        };
        r.apply_patch(&patch, 5_000);
        assert_eq!(r.progress, 40);
    }

    #[test]
    fn identity_fields_merge_while_gated() {
        let mut r = render(0, 20_000);
        let patch = RenderPatch {
            job_id: Some("job-9".to_string()),
            group_id: Some("grp-3".to_string()),
            price_cents: Some(250),
            ..Default::default()
        };
        r.apply_patch(&patch, 1_000);
        assert_eq!(r.job_id.as_deref(), Some("job-9"));
        assert_eq!(r.group_id.as_deref(), Some("grp-3"));
        assert_eq!(r.price_cents, Some(250));
    }

    // -- release --

    #[test]
    fn release_is_atomic() {
        let mut r = render(0, 20_000);
        r.ready_video_url = Some("https://cdn.example/v.mp4".to_string());
        assert!(!r.release_if_due(19_999));
        assert_eq!(r.status, RenderStatus::Pending);

        assert!(r.release_if_due(20_000));
        assert_eq!(r.status, RenderStatus::Completed);
        assert_eq!(r.progress, 100);
        assert_eq!(r.video_url.as_deref(), Some("https://cdn.example/v.mp4"));
        assert!(r.ready_video_url.is_none());
    }

    #[test]
    fn release_without_held_result_is_a_no_op() {
        let mut r = render(0, 20_000);
        assert!(!r.release_if_due(30_000));
        assert_eq!(r.status, RenderStatus::Pending);
    }

    #[test]
    fn completed_late_result_releases_held_url() {
        // Gate expires with a held URL, then a completion patch arrives.
        let mut r = render(0, 20_000);
        r.ready_video_url = Some("https://cdn.example/v.mp4".to_string());
        let patch = RenderPatch {
            status: Some(RenderStatus::Completed),
            ..Default::default()
        };
        r.apply_patch(&patch, 21_000);
        assert_eq!(r.status, RenderStatus::Completed);
        assert_eq!(r.video_url.as_deref(), Some("https://cdn.example/v.mp4"));
    }
}
