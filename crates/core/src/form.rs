//! Form state coercion against an engine's declared capabilities.
//!
//! Whenever the selected engine or mode changes, the previous form state
//! is coerced into something the new engine can actually run: unsupported
//! modes fall back, out-of-range durations are re-resolved, and option
//! lists keep the previous choice only when it is still a member.

use serde::{Deserialize, Serialize};

use crate::engine::{self, DurationOption, EngineCaps, Mode};

// ---------------------------------------------------------------------------
// Iteration limits
// ---------------------------------------------------------------------------

/// Minimum number of iterations a single submission can request.
pub const MIN_ITERATIONS: u32 = 1;
/// Maximum number of iterations a single submission can request.
pub const MAX_ITERATIONS: u32 = 4;

// ---------------------------------------------------------------------------
// Form state
// ---------------------------------------------------------------------------

/// Optional generation add-ons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Addons {
    /// Generate an audio track alongside the video.
    pub audio: bool,
    /// Upscale the output to 4K after generation.
    pub upscale_4k: bool,
}

/// Generation form, always coerced to be valid for its engine and mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormState {
    pub engine_id: String,
    pub mode: Mode,
    pub duration_sec: u32,
    /// Frame count to send, for frame-list engines.
    #[serde(default)]
    pub num_frames: Option<u32>,
    /// Option to send, for option-set engines.
    #[serde(default)]
    pub duration_option: Option<DurationOption>,
    pub resolution: Option<String>,
    pub aspect_ratio: Option<String>,
    pub fps: Option<u32>,
    pub iterations: u32,
    #[serde(default)]
    pub addons: Addons,
    /// Reuse the same seed across iterations; engine-independent, so it
    /// survives engine and mode switches untouched.
    #[serde(default)]
    pub seed_locked: bool,
    /// Caller-supplied provider API key, forwarded with submissions.
    /// Engine-independent like `seed_locked`.
    #[serde(default)]
    pub api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Keep a previous selection only when it is still a member of the
/// engine's declared list; otherwise take the first declared entry.
fn pick_member<T: Clone + PartialEq>(declared: &[T], prev: Option<&T>) -> Option<T> {
    match prev {
        Some(value) if declared.contains(value) => Some(value.clone()),
        _ => declared.first().cloned(),
    }
}

/// Coerce a form (possibly from another engine or a persisted session)
/// into a valid form for the given engine and mode.
///
/// The audio add-on is only offered for text-to-video on engines that
/// support it; everywhere else it is forced off so a stale preference
/// can never leak into a submission the engine would reject.
pub fn coerce_form(caps: &EngineCaps, mode: Mode, prev: Option<&FormState>) -> FormState {
    let mode = if caps.supports_mode(mode) {
        mode
    } else {
        caps.default_mode().unwrap_or(mode)
    };

    let preferred_secs = prev.map(|p| p.duration_sec);
    let duration = engine::resolve_duration(&caps.duration, preferred_secs);

    let audio_offered = caps.supports_audio && mode == Mode::TextToVideo;
    let addons = Addons {
        audio: if audio_offered {
            prev.map(|p| p.addons.audio).unwrap_or(true)
        } else {
            false
        },
        upscale_4k: prev.map(|p| p.addons.upscale_4k).unwrap_or(false),
    };

    FormState {
        engine_id: caps.id.clone(),
        mode,
        duration_sec: duration.seconds,
        num_frames: duration.frames,
        duration_option: duration.option,
        resolution: pick_member(&caps.resolutions, prev.and_then(|p| p.resolution.as_ref())),
        aspect_ratio: pick_member(&caps.aspect_ratios, prev.and_then(|p| p.aspect_ratio.as_ref())),
        fps: pick_member(&caps.fps_options, prev.and_then(|p| p.fps.as_ref())),
        iterations: prev
            .map(|p| p.iterations)
            .unwrap_or(MIN_ITERATIONS)
            .clamp(MIN_ITERATIONS, MAX_ITERATIONS),
        addons,
        seed_locked: prev.map(|p| p.seed_locked).unwrap_or(false),
        api_key: prev.and_then(|p| p.api_key.clone()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
