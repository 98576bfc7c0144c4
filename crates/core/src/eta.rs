//! Turnaround estimates derived from an engine's declared ETA profile.

use crate::engine::EngineCaps;

/// Estimated wait for one generation, with a display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eta {
    pub seconds: u32,
    pub label: String,
}

/// Estimate the wait for a job of the given output duration.
pub fn eta_for(caps: &EngineCaps, duration_sec: u32) -> Eta {
    let seconds = caps.eta.base_secs + caps.eta.secs_per_output_sec * duration_sec;
    Eta {
        seconds,
        label: eta_label(seconds),
    }
}

/// Format an estimate as a coarse human-readable label.
pub fn eta_label(seconds: u32) -> String {
    if seconds < 60 {
        format!("about {seconds} sec")
    } else {
        let minutes = (seconds as f64 / 60.0).round() as u32;
        if minutes <= 1 {
            "about 1 min".to_string()
        } else {
            format!("about {minutes} min")
        }
    }
}
