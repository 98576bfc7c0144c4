//! Engine capability descriptors and the derived input-schema summary.
//!
//! An engine advertises which generation modes it supports, how output
//! duration is expressed (a frame list, a discrete option set, or a
//! continuous range), and a declarative list of input fields. The pure
//! functions here turn those declarations into per-mode facts the rest
//! of the system consumes: which prompt fields exist, which asset slots
//! are required, and what duration a form should carry.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Frame-rate assumptions
// ---------------------------------------------------------------------------

/// Frame rate assumed when converting a frame count into seconds for
/// engines that express duration as a list of frame counts.
pub const ASSUMED_FPS: u32 = 24;

// ---------------------------------------------------------------------------
// Generation modes
// ---------------------------------------------------------------------------

/// Generation mode an engine can run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "t2v")]
    TextToVideo,
    #[serde(rename = "i2v")]
    ImageToVideo,
    #[serde(rename = "r2v")]
    ReferenceToVideo,
    #[serde(rename = "t2i")]
    TextToImage,
    #[serde(rename = "i2i")]
    ImageToImage,
}

impl Mode {
    /// Wire identifier for the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToVideo => "t2v",
            Self::ImageToVideo => "i2v",
            Self::ReferenceToVideo => "r2v",
            Self::TextToImage => "t2i",
            Self::ImageToImage => "i2i",
        }
    }

    /// Human-readable label for display.
    pub fn label(self) -> &'static str {
        match self {
            Self::TextToVideo => "Text to Video",
            Self::ImageToVideo => "Image to Video",
            Self::ReferenceToVideo => "Reference to Video",
            Self::TextToImage => "Text to Image",
            Self::ImageToImage => "Image to Image",
        }
    }

    /// Whether the mode produces a still image rather than a video.
    pub fn is_image_output(self) -> bool {
        matches!(self, Self::TextToImage | Self::ImageToImage)
    }
}

// ---------------------------------------------------------------------------
// Duration declarations
// ---------------------------------------------------------------------------

/// A single selectable duration option.
///
/// Engines declare options either as plain second counts or as opaque
/// tokens (for example `"5s"` or `"short"`) paired with the seconds they
/// resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationOption {
    /// Value sent to the provider when this option is selected.
    pub value: DurationValue,
    /// Seconds of output this option produces.
    pub seconds: u32,
}

/// Wire value of a duration option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u32),
    Token(String),
}

/// How an engine expresses output duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurationSpec {
    /// Duration is selected as a frame count from a fixed list.
    Frames { counts: Vec<u32> },
    /// Duration is selected from a discrete option set, with an optional
    /// declared default.
    Options {
        options: Vec<DurationOption>,
        default_seconds: Option<u32>,
    },
    /// Duration is any whole second count within an inclusive range,
    /// with an optional declared default.
    Range {
        min_secs: u32,
        #[serde(default)]
        default_secs: Option<u32>,
        max_secs: u32,
    },
}

// ---------------------------------------------------------------------------
// ETA profile
// ---------------------------------------------------------------------------

/// Declared turnaround characteristics used to estimate how long a job
/// will take before the first status response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EtaProfile {
    /// Fixed overhead in seconds regardless of output length.
    pub base_secs: u32,
    /// Additional seconds of wait per second of requested output.
    pub secs_per_output_sec: u32,
}

// ---------------------------------------------------------------------------
// Input fields
// ---------------------------------------------------------------------------

/// Kind of payload an input field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Image,
    Video,
}

/// One declared input field on an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineInputField {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    /// Modes the field applies to. `None` means all supported modes.
    #[serde(default)]
    pub modes: Option<Vec<Mode>>,
    /// Modes in which the field must be filled before submission.
    #[serde(default)]
    pub required_in_modes: Vec<Mode>,
    /// Minimum number of attachments required when the field is required.
    #[serde(default)]
    pub min_count: Option<u32>,
    /// Maximum number of attachments the field accepts.
    #[serde(default)]
    pub max_count: Option<u32>,
}

impl EngineInputField {
    /// Whether the field applies in the given mode.
    pub fn applies_in(&self, mode: Mode) -> bool {
        match &self.modes {
            Some(modes) => modes.contains(&mode),
            None => true,
        }
    }

    /// Whether the field must be filled before submission in the given mode.
    pub fn required_in(&self, mode: Mode) -> bool {
        self.required_in_modes.contains(&mode)
    }

    /// Minimum number of attachments needed when the field is required.
    pub fn min_required(&self) -> u32 {
        self.min_count.unwrap_or(1).max(1)
    }
}

// ---------------------------------------------------------------------------
// Engine capabilities
// ---------------------------------------------------------------------------

/// Full capability declaration for one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCaps {
    pub id: String,
    pub label: String,
    pub modes: Vec<Mode>,
    pub duration: DurationSpec,
    pub resolutions: Vec<String>,
    pub aspect_ratios: Vec<String>,
    pub fps_options: Vec<u32>,
    /// Whether the engine can generate an audio track.
    pub supports_audio: bool,
    pub eta: EtaProfile,
    #[serde(default)]
    pub input_fields: Vec<EngineInputField>,
}

impl EngineCaps {
    /// Whether the engine supports the given mode.
    pub fn supports_mode(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// First declared mode, used when a requested mode is unsupported.
    pub fn default_mode(&self) -> Option<Mode> {
        self.modes.first().copied()
    }
}

// ---------------------------------------------------------------------------
// Schema summary
// ---------------------------------------------------------------------------

/// An asset slot derived from the engine's field declarations for one mode.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSlot {
    pub field: EngineInputField,
    pub required: bool,
}

/// Per-mode digest of an engine's input fields.
///
/// Text fields are classified into at most one prompt field and at most
/// one negative-prompt field; image and video fields become asset slots
/// carrying a mode-specific required flag.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSummary {
    pub prompt_field: Option<EngineInputField>,
    pub negative_prompt_field: Option<EngineInputField>,
    pub asset_slots: Vec<AssetSlot>,
    /// Whether a non-empty prompt must be present before submission.
    pub prompt_required: bool,
}

/// Lowercase a string and strip everything but ASCII alphanumerics, so
/// `"Negative Prompt"`, `"negative_prompt"` and `"negativePrompt"` all
/// compare equal.
fn compact(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn is_negative_prompt_cue(field: &EngineInputField) -> bool {
    let id = compact(&field.id);
    let label = compact(&field.label);
    for key in [&id, &label] {
        if key == "negativeprompt" || key == "negprompt" {
            return true;
        }
        if key.contains("negative") && key.contains("prompt") {
            return true;
        }
    }
    false
}

/// Summarise an engine's input schema for one mode.
///
/// A text field whose id is exactly `prompt` wins the prompt slot; when
/// none exists, the first applicable text field without a negative cue
/// is used. An engine that declares no prompt field still requires a
/// prompt, keeping submission rules uniform across engines.
pub fn summarize_schema(caps: &EngineCaps, mode: Mode) -> SchemaSummary {
    let mut prompt_field: Option<EngineInputField> = None;
    let mut negative_prompt_field: Option<EngineInputField> = None;
    let mut asset_slots = Vec::new();

    for field in caps.input_fields.iter().filter(|f| f.applies_in(mode)) {
        match field.kind {
            FieldKind::Text => {
                if is_negative_prompt_cue(field) {
                    if negative_prompt_field.is_none() {
                        negative_prompt_field = Some(field.clone());
                    }
                } else if field.id == "prompt" {
                    prompt_field = Some(field.clone());
                } else if prompt_field.is_none() {
                    prompt_field = Some(field.clone());
                }
            }
            FieldKind::Image | FieldKind::Video => {
                asset_slots.push(AssetSlot {
                    required: field.required_in(mode),
                    field: field.clone(),
                });
            }
        }
    }

    let prompt_required = match &prompt_field {
        Some(f) => f.required_in_modes.is_empty() || f.required_in(mode),
        None => true,
    };

    SchemaSummary {
        prompt_field,
        negative_prompt_field,
        asset_slots,
        prompt_required,
    }
}

// ---------------------------------------------------------------------------
// Duration resolution
// ---------------------------------------------------------------------------

/// Seconds produced by a frame count at the assumed frame rate, rounded
/// to the nearest whole second and never below one.
pub fn frames_to_seconds(frames: u32) -> u32 {
    let secs = (frames as f64 / ASSUMED_FPS as f64).round() as u32;
    secs.max(1)
}

/// Resolve the duration a form should carry for this engine.
///
/// Frame-list engines convert a preferred or first frame count into
/// seconds. Option-set engines keep a preferred duration only when an
/// option resolves to exactly the same second count; otherwise the
/// declared default wins, then the first option. Range engines clamp
/// the preferred duration into the declared bounds.
pub fn resolve_duration(spec: &DurationSpec, preferred_secs: Option<u32>) -> ResolvedDuration {
    match spec {
        DurationSpec::Frames { counts } => {
            let frames = preferred_secs
                .map(|secs| secs * ASSUMED_FPS)
                .filter(|f| counts.contains(f))
                .or_else(|| counts.first().copied())
                .unwrap_or(ASSUMED_FPS);
            ResolvedDuration {
                seconds: frames_to_seconds(frames),
                frames: Some(frames),
                option: None,
            }
        }
        DurationSpec::Options {
            options,
            default_seconds,
        } => {
            let by_seconds = |secs: u32| options.iter().find(|o| o.seconds == secs);
            let chosen = preferred_secs
                .and_then(by_seconds)
                .or_else(|| default_seconds.and_then(by_seconds))
                .or_else(|| options.first());
            match chosen {
                Some(opt) => ResolvedDuration {
                    seconds: opt.seconds,
                    frames: None,
                    option: Some(opt.clone()),
                },
                None => ResolvedDuration {
                    seconds: default_seconds.unwrap_or(1),
                    frames: None,
                    option: None,
                },
            }
        }
        DurationSpec::Range {
            min_secs,
            default_secs,
            max_secs,
        } => {
            let preferred = preferred_secs.or(*default_secs).unwrap_or(*min_secs);
            ResolvedDuration {
                seconds: preferred.clamp(*min_secs, *max_secs),
                frames: None,
                option: None,
            }
        }
    }
}

/// Outcome of duration resolution for one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDuration {
    pub seconds: u32,
    /// Frame count to send, for frame-list engines.
    pub frames: Option<u32>,
    /// Option to send, for option-set engines.
    pub option: Option<DurationOption>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
