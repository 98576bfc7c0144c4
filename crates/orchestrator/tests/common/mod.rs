//! Shared test fixtures: a scriptable in-process provider and a
//! compressed timing config so full lifecycles run in milliseconds.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use reelgen_core::engine::{
    DurationSpec, EngineCaps, EngineInputField, EtaProfile, FieldKind, Mode,
};
use reelgen_orchestrator::Config;
use reelgen_provider::types::{
    GenerateRequest, GenerateResponse, JobStatusResponse, PreflightRequest, PreflightResponse,
    TopUpSession, WalletBalance,
};
use reelgen_provider::{ProviderError, RenderProvider};

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Compressed cadences: reveal window 300ms, polls every few tens of ms.
pub fn fast_config() -> Config {
    Config {
        progress_tick: Duration::from_millis(20),
        first_poll_delay: Duration::from_millis(30),
        poll_interval: Duration::from_millis(40),
        poll_retry_delay: Duration::from_millis(50),
        media_poll_interval: Duration::from_millis(60),
        preflight_debounce: Duration::from_millis(10),
        reveal_floor_ms: 300,
        eta_floor_secs: 0,
    }
}

/// One engine, text-to-video, instant ETA so the reveal floor governs.
pub fn test_engine() -> EngineCaps {
    EngineCaps {
        id: "engine-test".to_string(),
        label: "Test Engine".to_string(),
        modes: vec![Mode::TextToVideo],
        duration: DurationSpec::Range {
            min_secs: 1,
            default_secs: None,
            max_secs: 10,
        },
        resolutions: vec!["720p".to_string()],
        aspect_ratios: vec!["16:9".to_string()],
        fps_options: vec![24],
        supports_audio: false,
        eta: EtaProfile {
            base_secs: 0,
            secs_per_output_sec: 0,
        },
        input_fields: vec![EngineInputField {
            id: "prompt".to_string(),
            label: "Prompt".to_string(),
            kind: FieldKind::Text,
            modes: None,
            required_in_modes: Vec::new(),
            min_count: None,
            max_count: None,
        }],
    }
}

/// Engine whose negative prompt is mandatory in text-to-video.
pub fn strict_engine() -> EngineCaps {
    let mut caps = test_engine();
    caps.id = "engine-strict".to_string();
    caps.label = "Strict Engine".to_string();
    caps.input_fields.push(EngineInputField {
        id: "negative_prompt".to_string(),
        label: "Negative prompt".to_string(),
        kind: FieldKind::Text,
        modes: None,
        required_in_modes: vec![Mode::TextToVideo],
        min_count: None,
        max_count: None,
    });
    caps
}

/// Engine with an image-conditioned mode: the start image is mandatory
/// in image-to-video and absent from the text-to-video schema.
pub fn image_engine() -> EngineCaps {
    let mut caps = test_engine();
    caps.id = "engine-image".to_string();
    caps.label = "Image Engine".to_string();
    caps.modes = vec![Mode::TextToVideo, Mode::ImageToVideo];
    caps.input_fields.push(EngineInputField {
        id: "start_image".to_string(),
        label: "Start image".to_string(),
        kind: FieldKind::Image,
        modes: Some(vec![Mode::ImageToVideo]),
        required_in_modes: vec![Mode::ImageToVideo],
        min_count: Some(1),
        max_count: Some(1),
    });
    caps
}

// ---------------------------------------------------------------------------
// Scriptable provider
// ---------------------------------------------------------------------------

/// One scripted poll response. The last step of a script repeats.
#[derive(Debug, Clone)]
pub enum Step {
    /// Simulated poll failure.
    Error,
    Pending(u8),
    /// Reports completed but without a media URL yet.
    CompletedNoMedia,
    Completed,
    Failed(&'static str),
}

/// Outcome of one `generate` call, consumed in submission order.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Ok,
    InsufficientFunds { required_cents: i64 },
    /// Structured non-funds refusal, e.g. provider outage.
    Rejected { message: &'static str },
}

struct MockState {
    balance_cents: i64,
    unit_cents: i64,
    generate_plan: VecDeque<GenerateOutcome>,
    default_script: Vec<Step>,
    scripts: HashMap<String, VecDeque<Step>>,
    next_job: u32,
    generated: Vec<GenerateRequest>,
    preflights: Vec<PreflightRequest>,
    /// When set, `generate` answers like a provider that finished the
    /// job synchronously, media and payment status included.
    generate_with_media: bool,
}

pub struct MockProvider {
    engines: Vec<EngineCaps>,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_engines(vec![test_engine()])
    }

    pub fn with_engines(engines: Vec<EngineCaps>) -> Self {
        Self {
            engines,
            state: Mutex::new(MockState {
                balance_cents: 100_000,
                unit_cents: 100,
                generate_plan: VecDeque::new(),
                default_script: vec![Step::Completed],
                scripts: HashMap::new(),
                next_job: 0,
                generated: Vec::new(),
                preflights: Vec::new(),
                generate_with_media: false,
            }),
        }
    }

    pub fn set_balance(&self, cents: i64) {
        self.state.lock().unwrap().balance_cents = cents;
    }

    pub fn set_unit_price(&self, cents: i64) {
        self.state.lock().unwrap().unit_cents = cents;
    }

    /// Script applied to every job that has no explicit script.
    pub fn set_default_script(&self, steps: Vec<Step>) {
        self.state.lock().unwrap().default_script = steps;
    }

    pub fn script_job(&self, job_id: &str, steps: Vec<Step>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(job_id.to_string(), steps.into());
    }

    /// Per-iteration generate outcomes, consumed in order. Once empty,
    /// every call succeeds.
    pub fn plan_generates(&self, plan: Vec<GenerateOutcome>) {
        self.state.lock().unwrap().generate_plan = plan.into();
    }

    pub fn generated_requests(&self) -> Vec<GenerateRequest> {
        self.state.lock().unwrap().generated.clone()
    }

    pub fn preflight_requests(&self) -> Vec<PreflightRequest> {
        self.state.lock().unwrap().preflights.clone()
    }

    pub fn set_generate_with_media(&self, on: bool) {
        self.state.lock().unwrap().generate_with_media = on;
    }

    fn media_url(job_id: &str) -> String {
        format!("https://cdn.example/{job_id}.mp4")
    }

    fn response_for(job_id: &str, step: &Step) -> JobStatusResponse {
        let mut resp = JobStatusResponse {
            job_id: job_id.to_string(),
            status: "pending".to_string(),
            progress: None,
            message: None,
            video_url: None,
            thumb_url: None,
            group_id: None,
            iteration_index: None,
            iteration_count: None,
            final_price_cents: None,
            currency: None,
            payment_status: None,
        };
        match step {
            Step::Pending(progress) => resp.progress = Some(*progress),
            Step::CompletedNoMedia => resp.status = "completed".to_string(),
            Step::Completed => {
                resp.status = "completed".to_string();
                resp.video_url = Some(Self::media_url(job_id));
                resp.final_price_cents = Some(100);
                resp.currency = Some("USD".to_string());
            }
            Step::Failed(message) => {
                resp.status = "failed".to_string();
                resp.message = Some(message.to_string());
            }
            Step::Error => unreachable!("Error steps never build a response"),
        }
        resp
    }
}

#[async_trait]
impl RenderProvider for MockProvider {
    async fn list_engines(&self) -> Result<Vec<EngineCaps>, ProviderError> {
        Ok(self.engines.clone())
    }

    async fn preflight(&self, req: &PreflightRequest) -> Result<PreflightResponse, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.preflights.push(req.clone());
        Ok(PreflightResponse {
            total_cents: state.unit_cents * i64::from(req.iterations),
            unit_cents: Some(state.unit_cents),
            currency: "USD".to_string(),
        })
    }

    async fn generate(&self, req: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.generated.push(req.clone());
        match state.generate_plan.pop_front() {
            Some(GenerateOutcome::InsufficientFunds { required_cents }) => {
                let balance = state.balance_cents;
                Err(ProviderError::Api {
                    status: 402,
                    code: Some("INSUFFICIENT_WALLET_FUNDS".to_string()),
                    message: Some("not enough funds".to_string()),
                    required_cents: Some(required_cents),
                    balance_cents: Some(balance),
                })
            }
            Some(GenerateOutcome::Rejected { message }) => Err(ProviderError::Api {
                status: 500,
                code: Some("ENGINE_UNAVAILABLE".to_string()),
                message: Some(message.to_string()),
                required_cents: None,
                balance_cents: None,
            }),
            Some(GenerateOutcome::Ok) | None => {
                let job_id = format!("job-{}", state.next_job);
                state.next_job += 1;
                if !state.scripts.contains_key(&job_id) {
                    let script = state.default_script.clone();
                    state.scripts.insert(job_id.clone(), script.into());
                }
                let (status, video_url, thumb_url, payment_status) = if state.generate_with_media {
                    (
                        Some("completed".to_string()),
                        Some(Self::media_url(&job_id)),
                        Some(format!("https://cdn.example/{job_id}.jpg")),
                        Some("paid".to_string()),
                    )
                } else {
                    (None, None, None, None)
                };
                Ok(GenerateResponse {
                    job_id,
                    batch_id: Some(req.batch_id.clone()),
                    group_id: Some(format!("grp-{}", req.batch_id)),
                    iteration_index: Some(req.iteration_index),
                    iteration_count: Some(req.iteration_count),
                    status,
                    progress: None,
                    message: None,
                    video_url,
                    thumb_url,
                    price_cents: Some(state.unit_cents),
                    currency: Some("USD".to_string()),
                    payment_status,
                    eta_seconds: None,
                    eta_label: None,
                })
            }
        }
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ProviderError> {
        let mut state = self.state.lock().unwrap();
        let script = state
            .scripts
            .get_mut(job_id)
            .ok_or_else(|| ProviderError::Decode(format!("unknown job {job_id}")))?;
        let step = if script.len() > 1 {
            script.pop_front().unwrap_or(Step::Completed)
        } else {
            script.front().cloned().unwrap_or(Step::Completed)
        };
        match step {
            Step::Error => Err(ProviderError::Decode("simulated poll failure".to_string())),
            other => Ok(Self::response_for(job_id, &other)),
        }
    }

    async fn wallet_balance(&self) -> Result<WalletBalance, ProviderError> {
        Ok(WalletBalance {
            balance_cents: self.state.lock().unwrap().balance_cents,
            currency: Some("USD".to_string()),
        })
    }

    async fn create_topup(&self, amount_cents: i64) -> Result<TopUpSession, ProviderError> {
        Ok(TopUpSession {
            url: format!("https://pay.example/checkout?amount={amount_cents}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Polling helpers
// ---------------------------------------------------------------------------

/// Await a condition over the orchestrator, failing after `timeout`.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
