//! Request and response bodies for the provider API.

use serde::{Deserialize, Serialize};

use reelgen_core::engine::{DurationValue, Mode};
use reelgen_core::wallet::MemberTier;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// One uploaded asset referenced by a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub field_id: String,
    pub url: String,
}

/// Body of `POST /generate`, one iteration of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub engine_id: String,
    pub mode: Mode,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub duration_sec: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_frames: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_value: Option<DurationValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<u32>,
    pub batch_id: String,
    pub iteration_index: u32,
    pub iteration_count: u32,
    pub audio: bool,
    pub upscale_4k: bool,
    pub seed_locked: bool,
    /// Caller-supplied key generated against the caller's own provider
    /// account instead of the platform one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentPayload>,
}

/// Body of a successful `POST /generate` response. Everything beyond
/// the job id is optional; whatever the provider echoes back is merged
/// into the local record on submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub job_id: String,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub iteration_index: Option<u32>,
    #[serde(default)]
    pub iteration_count: Option<u32>,
    /// Provider status string; parsed leniently on the client side.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub eta_seconds: Option<u32>,
    #[serde(default)]
    pub eta_label: Option<String>,
}

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

/// Body of `GET /jobs/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: String,
    /// Provider status string; parsed leniently on the client side.
    pub status: String,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumb_url: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub iteration_index: Option<u32>,
    #[serde(default)]
    pub iteration_count: Option<u32>,
    #[serde(default)]
    pub final_price_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

// ---------------------------------------------------------------------------
// Preflight pricing
// ---------------------------------------------------------------------------

/// Body of `POST /preflight`, priced before anything is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightRequest {
    pub engine_id: String,
    pub mode: Mode,
    pub duration_sec: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub iterations: u32,
    pub audio: bool,
    pub upscale_4k: bool,
    pub seed_locked: bool,
    /// Membership tier of the caller, for tier pricing.
    pub user_tier: MemberTier,
}

/// Quoted price for a prospective submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightResponse {
    /// Price for the whole submission, all iterations included.
    pub total_cents: i64,
    #[serde(default)]
    pub unit_cents: Option<i64>,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Body of `GET /wallet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub balance_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Body of `POST /wallet/topup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    pub amount_cents: i64,
}

/// Checkout session created for a top-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpSession {
    /// Redirect URL the caller must open to complete payment.
    pub url: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error envelope returned on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// For funds errors: the shortfall in cents, already net of balance.
    #[serde(default)]
    pub required_cents: Option<i64>,
    #[serde(default)]
    pub balance_cents: Option<i64>,
}
