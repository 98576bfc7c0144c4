//! The orchestrator proper: draft editing, submission, rollback, scope
//! switching, and session resume.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use reelgen_core::attachment::{AddOutcome, Attachment, AttachmentSet};
use reelgen_core::engine::{summarize_schema, EngineCaps, Mode, SchemaSummary};
use reelgen_core::error::CoreError;
use reelgen_core::eta::eta_for;
use reelgen_core::form::{coerce_form, FormState, MAX_ITERATIONS, MIN_ITERATIONS};
use reelgen_core::render::{min_duration_ms, LocalRender, RenderPatch, RenderStatus, PROGRESS_FLOOR};
use reelgen_core::wallet::{format_minor_units, MemberTier, PaymentMode};
use reelgen_provider::types::{AttachmentPayload, GenerateRequest, PreflightRequest};
use reelgen_provider::RenderProvider;
use reelgen_store::{LocalStore, SessionState, StorageScope};

use crate::config::Config;
use crate::error::OrchestratorError;
use crate::events::{EventBus, OrchestratorEvent};
use crate::now_ms;
use crate::poll::poll_job;
use crate::preflight::PreflightProxy;
use crate::progress::spawn_progress_ticker;
use crate::table::RenderTable;
use crate::topup::TopUpPrompt;

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// Everything the user is editing but has not submitted yet.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub prompt: String,
    pub negative_prompt: String,
    pub form: Option<FormState>,
    pub attachments: AttachmentSet,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

struct Inner {
    provider: Arc<dyn RenderProvider>,
    store: LocalStore,
    scope: RwLock<StorageScope>,
    table: RenderTable,
    events: Arc<EventBus>,
    config: Config,
    cancel: CancellationToken,
    engines: RwLock<Vec<EngineCaps>>,
    draft: RwLock<Draft>,
    member_tier: RwLock<MemberTier>,
    payment_mode: RwLock<PaymentMode>,
    topup: Mutex<Option<TopUpPrompt>>,
    preflight: PreflightProxy,
}

/// Shared handle to one generation session. Cloning is cheap; all
/// clones observe the same state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn RenderProvider>, store: LocalStore, config: Config) -> Self {
        let events = Arc::new(EventBus::default());
        let preflight = PreflightProxy::new(provider.clone(), config.preflight_debounce);
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                scope: RwLock::new(StorageScope::Anonymous),
                table: RenderTable::default(),
                events,
                config,
                cancel: CancellationToken::new(),
                engines: RwLock::new(Vec::new()),
                draft: RwLock::new(Draft::default()),
                member_tier: RwLock::new(MemberTier::default()),
                payment_mode: RwLock::new(PaymentMode::default()),
                topup: Mutex::new(None),
                preflight,
            }),
        }
    }

    // ---- accessors ----

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub async fn draft(&self) -> Draft {
        self.inner.draft.read().await.clone()
    }

    pub async fn renders(&self) -> Vec<LocalRender> {
        self.inner.table.snapshot().await
    }

    /// Aggregated group rows as of now, newest first.
    pub async fn groups(&self) -> Vec<reelgen_core::group::GroupSummary> {
        self.inner.table.groups(now_ms()).await
    }

    pub async fn topup_prompt(&self) -> Option<TopUpPrompt> {
        self.inner.topup.lock().await.clone()
    }

    pub async fn member_tier(&self) -> MemberTier {
        *self.inner.member_tier.read().await
    }

    /// Set the caller's membership tier. Quotes depend on it, so any
    /// debounced quote in flight is invalidated.
    pub async fn set_member_tier(&self, tier: MemberTier) {
        *self.inner.member_tier.write().await = tier;
        self.inner.preflight.invalidate();
        self.persist().await;
    }

    pub async fn payment_mode(&self) -> PaymentMode {
        *self.inner.payment_mode.read().await
    }

    pub async fn set_payment_mode(&self, mode: PaymentMode) {
        *self.inner.payment_mode.write().await = mode;
    }

    /// Stop every background task this session spawned.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub(crate) fn provider(&self) -> &Arc<dyn RenderProvider> {
        &self.inner.provider
    }

    pub(crate) fn table(&self) -> &RenderTable {
        &self.inner.table
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    // ---- engines and draft editing ----

    /// Fetch engine capabilities and seed the form when none exists.
    pub async fn refresh_engines(&self) -> Result<(), OrchestratorError> {
        let engines = self.inner.provider.list_engines().await?;
        {
            let mut draft = self.inner.draft.write().await;
            if draft.form.is_none() {
                if let Some(caps) = engines.first() {
                    let mode = caps.default_mode().unwrap_or(Mode::TextToVideo);
                    draft.form = Some(coerce_form(caps, mode, None));
                }
            }
        }
        *self.inner.engines.write().await = engines;
        Ok(())
    }

    pub async fn engines(&self) -> Vec<EngineCaps> {
        self.inner.engines.read().await.clone()
    }

    async fn caps_for(&self, engine_id: &str) -> Result<EngineCaps, OrchestratorError> {
        self.inner
            .engines
            .read()
            .await
            .iter()
            .find(|c| c.id == engine_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownEngine(engine_id.to_string()))
    }

    pub async fn set_prompt(&self, prompt: impl Into<String>) {
        self.inner.draft.write().await.prompt = prompt.into();
        self.inner.preflight.invalidate();
    }

    pub async fn set_negative_prompt(&self, prompt: impl Into<String>) {
        self.inner.draft.write().await.negative_prompt = prompt.into();
    }

    /// Switch engine, carrying over whatever of the previous form the
    /// new engine can express. Attachments bound to fields the new
    /// schema lacks are returned for resource release.
    pub async fn select_engine(
        &self,
        engine_id: &str,
    ) -> Result<Vec<Attachment>, OrchestratorError> {
        let caps = self.caps_for(engine_id).await?;
        let mut draft = self.inner.draft.write().await;
        let mode = draft.form.as_ref().map(|f| f.mode).unwrap_or(Mode::TextToVideo);
        let form = coerce_form(&caps, mode, draft.form.as_ref());
        let schema = summarize_schema(&caps, form.mode);
        let released = draft.attachments.retain_fields(&schema);
        draft.form = Some(form);
        self.inner.preflight.invalidate();
        Ok(released)
    }

    /// Switch mode on the current engine. Same release contract as
    /// [`select_engine`](Self::select_engine).
    pub async fn select_mode(&self, mode: Mode) -> Result<Vec<Attachment>, OrchestratorError> {
        let engine_id = self
            .current_form()
            .await
            .ok_or_else(|| CoreError::Validation("No engine selected".to_string()))?
            .engine_id;
        let caps = self.caps_for(&engine_id).await?;
        let mut draft = self.inner.draft.write().await;
        let form = coerce_form(&caps, mode, draft.form.as_ref());
        let schema = summarize_schema(&caps, form.mode);
        let released = draft.attachments.retain_fields(&schema);
        draft.form = Some(form);
        self.inner.preflight.invalidate();
        Ok(released)
    }

    /// Apply an edit to the form, re-coercing the result so it stays
    /// valid for the current engine.
    pub async fn edit_form<F>(&self, f: F) -> Result<FormState, OrchestratorError>
    where
        F: FnOnce(&mut FormState),
    {
        let engine_id = self
            .current_form()
            .await
            .ok_or_else(|| CoreError::Validation("No engine selected".to_string()))?
            .engine_id;
        let caps = self.caps_for(&engine_id).await?;
        let mut draft = self.inner.draft.write().await;
        let mut form = draft
            .form
            .clone()
            .ok_or_else(|| CoreError::Validation("No engine selected".to_string()))?;
        f(&mut form);
        let coerced = coerce_form(&caps, form.mode, Some(&form));
        draft.form = Some(coerced.clone());
        self.inner.preflight.invalidate();
        Ok(coerced)
    }

    pub async fn set_iterations(&self, n: u32) -> Result<FormState, OrchestratorError> {
        self.edit_form(|f| f.iterations = n.clamp(MIN_ITERATIONS, MAX_ITERATIONS))
            .await
    }

    pub async fn add_attachment(
        &self,
        attachment: Attachment,
    ) -> Result<AddOutcome, OrchestratorError> {
        let schema = self.current_schema().await?;
        let mut draft = self.inner.draft.write().await;
        Ok(draft.attachments.add(&schema, attachment))
    }

    pub async fn remove_attachment(&self, field_id: &str, index: usize) -> Option<Attachment> {
        self.inner
            .draft
            .write()
            .await
            .attachments
            .remove(field_id, index)
    }

    async fn current_form(&self) -> Option<FormState> {
        self.inner.draft.read().await.form.clone()
    }

    async fn current_schema(&self) -> Result<SchemaSummary, OrchestratorError> {
        let form = self
            .current_form()
            .await
            .ok_or_else(|| CoreError::Validation("No engine selected".to_string()))?;
        let caps = self.caps_for(&form.engine_id).await?;
        Ok(summarize_schema(&caps, form.mode))
    }

    /// Debounced price quote for the current draft. `Ok(None)` means a
    /// newer edit superseded this quote.
    pub async fn quote_price(&self) -> Result<Option<i64>, OrchestratorError> {
        let form = self
            .current_form()
            .await
            .ok_or_else(|| CoreError::Validation("No engine selected".to_string()))?;
        let tier = self.member_tier().await;
        let req = preflight_request(&form, tier);
        let quote = self.inner.preflight.quote(&req).await?;
        Ok(quote.map(|q| q.total_cents))
    }

    // ---- submission ----

    /// Validate the draft against the engine schema without mutating
    /// anything.
    pub async fn validate_draft(&self) -> Result<(), OrchestratorError> {
        let draft = self.draft().await;
        let form = draft
            .form
            .as_ref()
            .ok_or_else(|| CoreError::Validation("No engine selected".to_string()))?;
        let caps = self.caps_for(&form.engine_id).await?;
        let schema = summarize_schema(&caps, form.mode);
        if schema.prompt_required && draft.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt is required".to_string()).into());
        }
        if let Some(field) = schema.negative_prompt_field.as_ref() {
            if field.required_in(form.mode) && draft.negative_prompt.trim().is_empty() {
                return Err(
                    CoreError::Validation(format!("{} is required", field.label)).into(),
                );
            }
        }
        if let Some(field) = draft.attachments.missing_required_field(&schema) {
            return Err(
                CoreError::Validation(format!("{} is required", field.label)).into(),
            );
        }
        Ok(())
    }

    /// Submit the current draft as a batch of iterations.
    ///
    /// Validation and the wallet check both happen before any record is
    /// created, so an unaffordable batch leaves no trace in the table.
    /// Returns the client batch id.
    pub async fn start_render(&self) -> Result<String, OrchestratorError> {
        if self.inner.topup.lock().await.is_some() {
            return Err(OrchestratorError::TopUpOpen);
        }
        self.validate_draft().await?;

        let draft = self.draft().await;
        let form = draft
            .form
            .clone()
            .ok_or_else(|| CoreError::Validation("No engine selected".to_string()))?;
        let caps = self.caps_for(&form.engine_id).await?;
        let schema = summarize_schema(&caps, form.mode);

        // Wallet pre-check, wallet-backed payment only: priced for the
        // whole batch up front. Platform-billed submissions settle on
        // the provider side.
        if self.payment_mode().await == PaymentMode::Wallet {
            let tier = self.member_tier().await;
            let quote = self
                .inner
                .provider
                .preflight(&preflight_request(&form, tier))
                .await?;
            let balance = self.inner.provider.wallet_balance().await?;
            if balance.balance_cents < quote.total_cents {
                let shortfall = quote.total_cents - balance.balance_cents;
                self.open_topup(shortfall, &quote.currency).await;
                return Err(OrchestratorError::InsufficientFunds {
                    required_cents: quote.total_cents,
                    balance_cents: balance.balance_cents,
                });
            }
        }

        let batch_id = uuid::Uuid::new_v4().to_string();
        let eta = eta_for(&caps, form.duration_sec);
        let window = min_duration_ms(
            Some(eta.seconds),
            self.inner.config.reveal_floor_ms,
            self.inner.config.eta_floor_secs,
        );
        let attachments: Vec<AttachmentPayload> = draft
            .attachments
            .ordered_payload(&schema)
            .into_iter()
            .map(|a| AttachmentPayload {
                field_id: a.field_id.clone(),
                url: a.url.clone(),
            })
            .collect();

        tracing::info!(
            batch_id = %batch_id,
            engine_id = %form.engine_id,
            iterations = form.iterations,
            "starting batch"
        );
        self.inner.events.publish(OrchestratorEvent::BatchStarted {
            batch_id: batch_id.clone(),
            count: form.iterations,
        });

        for index in 0..form.iterations {
            let local_key = uuid::Uuid::new_v4().to_string();
            let started_at = now_ms();
            let render = LocalRender {
                local_key: local_key.clone(),
                job_id: None,
                batch_id: batch_id.clone(),
                group_id: None,
                iteration_index: index,
                iteration_count: form.iterations,
                engine_id: caps.id.clone(),
                engine_label: caps.label.clone(),
                prompt: draft.prompt.clone(),
                aspect_ratio: form.aspect_ratio.clone(),
                duration_sec: form.duration_sec,
                status: RenderStatus::Pending,
                progress: PROGRESS_FLOOR,
                message: None,
                video_url: None,
                ready_video_url: None,
                thumb_url: None,
                price_cents: None,
                currency: None,
                payment_status: None,
                eta_seconds: Some(eta.seconds),
                eta_label: Some(eta.label.clone()),
                started_at,
                min_ready_at: started_at + window,
                created_at: started_at,
            };
            self.inner.table.insert(render).await;
            // First member created claims the batch's hero slot.
            if self.inner.table.assign_hero(&batch_id, &local_key).await {
                self.inner.events.publish(OrchestratorEvent::HeroAssigned {
                    batch_id: batch_id.clone(),
                    local_key: local_key.clone(),
                });
            }
            self.inner.events.publish(OrchestratorEvent::RenderUpdated {
                local_key: local_key.clone(),
            });
            spawn_progress_ticker(
                self.inner.table.clone(),
                self.inner.events.clone(),
                local_key.clone(),
                self.inner.config.clone(),
                self.inner.cancel.child_token(),
            );

            let request = GenerateRequest {
                engine_id: form.engine_id.clone(),
                mode: form.mode,
                prompt: draft.prompt.clone(),
                negative_prompt: schema
                    .negative_prompt_field
                    .as_ref()
                    .filter(|_| !draft.negative_prompt.trim().is_empty())
                    .map(|_| draft.negative_prompt.clone()),
                duration_sec: form.duration_sec,
                num_frames: form.num_frames,
                duration_value: form.duration_option.as_ref().map(|o| o.value.clone()),
                resolution: form.resolution.clone(),
                aspect_ratio: form.aspect_ratio.clone(),
                fps: form.fps,
                batch_id: batch_id.clone(),
                iteration_index: index,
                iteration_count: form.iterations,
                audio: form.addons.audio,
                upscale_4k: form.addons.upscale_4k,
                seed_locked: form.seed_locked,
                api_key: form.api_key.clone(),
                attachments: attachments.clone(),
            };

            let this = self.clone();
            tokio::spawn(async move {
                this.run_iteration(local_key, request).await;
            });
        }

        self.persist().await;
        Ok(batch_id)
    }

    /// Submit one iteration and drive it to a terminal state.
    async fn run_iteration(&self, local_key: String, request: GenerateRequest) {
        match self.inner.provider.generate(&request).await {
            Ok(resp) => {
                let job_id = resp.job_id.clone();
                // Same lenience as the poll path: a completion claim
                // without media stays pending until media shows up.
                let status = match resp.status.as_deref().map(RenderStatus::parse) {
                    Some(RenderStatus::Completed) if resp.video_url.is_none() => None,
                    other => other,
                };
                let patch = RenderPatch {
                    job_id: Some(job_id.clone()),
                    group_id: resp.group_id,
                    iteration_index: resp.iteration_index,
                    iteration_count: resp.iteration_count,
                    status,
                    progress: resp.progress,
                    message: resp.message,
                    video_url: resp.video_url,
                    thumb_url: resp.thumb_url,
                    price_cents: resp.price_cents,
                    currency: resp.currency,
                    payment_status: resp.payment_status,
                    eta_seconds: resp.eta_seconds,
                    eta_label: resp.eta_label,
                };
                let now = now_ms();
                self.inner
                    .table
                    .update(&local_key, |r| r.apply_patch(&patch, now))
                    .await;
                self.inner.events.publish(OrchestratorEvent::RenderUpdated {
                    local_key: local_key.clone(),
                });
                self.persist().await;
                poll_job(self.clone(), local_key, job_id).await;
            }
            Err(e) if e.is_insufficient_funds() => {
                // Roll the optimistic record back; sibling iterations
                // already submitted keep running.
                tracing::warn!(local_key = %local_key, "iteration refused for funds, rolling back");
                self.inner.table.remove(&local_key).await;
                self.inner
                    .events
                    .publish(OrchestratorEvent::RenderRemoved {
                        local_key: local_key.clone(),
                    });
                let shortfall = e.funds_shortfall_cents().unwrap_or(0);
                self.open_topup(shortfall, "USD").await;
                self.persist().await;
            }
            Err(e) => {
                // A submission that never produced a job leaves no
                // record behind; the failure surfaces as a notice.
                tracing::warn!(local_key = %local_key, error = %e, "generate failed, rolling back");
                self.inner.table.remove(&local_key).await;
                self.inner
                    .events
                    .publish(OrchestratorEvent::RenderRemoved {
                        local_key: local_key.clone(),
                    });
                let message = e.user_message().unwrap_or("Generation failed").to_string();
                self.inner
                    .events
                    .publish(OrchestratorEvent::Notice { message });
                self.persist().await;
            }
        }
    }

    // ---- top-up flow ----

    async fn open_topup(&self, shortfall_cents: i64, currency: &str) {
        let mut topup = self.inner.topup.lock().await;
        if topup.is_some() {
            return;
        }
        let message = if shortfall_cents > 0 {
            format!(
                "Insufficient wallet balance. Add at least {} to continue generating.",
                format_minor_units(shortfall_cents, currency)
            )
        } else {
            "Insufficient wallet balance. Please add funds to continue generating.".to_string()
        };
        *topup = Some(TopUpPrompt::for_shortfall(shortfall_cents, message));
        self.inner
            .events
            .publish(OrchestratorEvent::TopUpRequired { shortfall_cents });
    }

    pub async fn select_topup_amount(&self, cents: i64) -> Option<TopUpPrompt> {
        let mut topup = self.inner.topup.lock().await;
        let prompt = topup.as_mut()?;
        prompt.select_amount(cents);
        Some(prompt.clone())
    }

    /// Create a checkout session for the selected amount and close the
    /// prompt. Returns the redirect URL.
    pub async fn confirm_topup(&self) -> Result<String, OrchestratorError> {
        let amount = {
            let topup = self.inner.topup.lock().await;
            topup
                .as_ref()
                .map(|p| p.amount_cents)
                .ok_or(OrchestratorError::TopUpOpen)?
        };
        let session = self.inner.provider.create_topup(amount).await?;
        *self.inner.topup.lock().await = None;
        self.inner.events.publish(OrchestratorEvent::TopUpCheckout {
            url: session.url.clone(),
        });
        Ok(session.url)
    }

    pub async fn cancel_topup(&self) {
        let mut topup = self.inner.topup.lock().await;
        if topup.take().is_some() {
            self.inner.events.publish(OrchestratorEvent::Notice {
                message: "Top-up dismissed".to_string(),
            });
        }
    }

    // ---- persistence and scope ----

    /// Write the current session to the store for the active scope.
    pub(crate) async fn persist(&self) {
        let scope = self.inner.scope.read().await.clone();
        let draft = self.draft().await;
        let state = SessionState {
            prompt: draft.prompt,
            negative_prompt: draft.negative_prompt,
            form: draft.form,
            member_tier: self.member_tier().await,
            renders: self.inner.table.snapshot().await,
            heroes: self.inner.table.heroes().await,
        };
        if let Err(e) = self.inner.store.save(&scope, &state) {
            tracing::warn!(error = %e, "failed to persist session");
        }
    }

    /// Load the active scope's session and resume its in-flight jobs.
    pub async fn resume(&self) -> Result<(), OrchestratorError> {
        let scope = self.inner.scope.read().await.clone();
        let session = self.inner.store.load(&scope);
        {
            let mut draft = self.inner.draft.write().await;
            draft.prompt = session.prompt;
            draft.negative_prompt = session.negative_prompt;
            if session.form.is_some() {
                draft.form = session.form;
            }
        }
        *self.inner.member_tier.write().await = session.member_tier;
        self.inner.table.restore_heroes(session.heroes).await;
        // Persisted renders are newest first; reinsert oldest first so
        // head insertion rebuilds the original display order.
        for render in session.renders.into_iter().rev() {
            // The store only persists pending records with a job id.
            let Some(job_id) = render.job_id.clone() else {
                continue;
            };
            let local_key = render.local_key.clone();
            self.inner.table.insert(render).await;
            self.inner.events.publish(OrchestratorEvent::RenderUpdated {
                local_key: local_key.clone(),
            });
            spawn_progress_ticker(
                self.inner.table.clone(),
                self.inner.events.clone(),
                local_key.clone(),
                self.inner.config.clone(),
                self.inner.cancel.child_token(),
            );
            let this = self.clone();
            tokio::spawn(async move {
                poll_job(this, local_key, job_id).await;
            });
        }
        Ok(())
    }

    /// Switch storage scope, e.g. on sign-in or sign-out.
    ///
    /// Signing in adopts the anonymous session when the user has none.
    /// The table is rebuilt from the new scope's persisted session.
    pub async fn set_scope(&self, scope: StorageScope) -> Result<(), OrchestratorError> {
        if !scope.is_anonymous() {
            self.inner.store.adopt_anonymous(&scope)?;
        }
        *self.inner.scope.write().await = scope;
        self.inner.table.clear().await;
        *self.inner.draft.write().await = Draft::default();
        self.resume().await
    }
}

fn preflight_request(form: &FormState, tier: MemberTier) -> PreflightRequest {
    PreflightRequest {
        engine_id: form.engine_id.clone(),
        mode: form.mode,
        duration_sec: form.duration_sec,
        resolution: form.resolution.clone(),
        iterations: form.iterations,
        audio: form.addons.audio,
        upscale_4k: form.addons.upscale_4k,
        seed_locked: form.seed_locked,
        user_tier: tier,
    }
}
