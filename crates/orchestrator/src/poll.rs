//! Per-job status polling.
//!
//! Each submitted job gets one poll task: a short delay before the
//! first poll, a steady cadence after that, silent retry on transport
//! errors with no attempt ceiling, and a slower cadence once a job says
//! it is done but its media URL has not appeared yet. The task also
//! waits out the reveal gate and performs the release.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use reelgen_core::render::{RenderPatch, RenderStatus};
use reelgen_provider::types::JobStatusResponse;

use crate::events::OrchestratorEvent;
use crate::now_ms;
use crate::orchestrator::Orchestrator;

/// Sleep unless cancelled first. Returns `true` when cancelled.
async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

fn patch_from(status: &JobStatusResponse, parsed: Option<RenderStatus>) -> RenderPatch {
    RenderPatch {
        job_id: Some(status.job_id.clone()),
        group_id: status.group_id.clone(),
        iteration_index: status.iteration_index,
        iteration_count: status.iteration_count,
        status: parsed,
        progress: status.progress,
        message: status.message.clone(),
        video_url: status.video_url.clone(),
        thumb_url: status.thumb_url.clone(),
        price_cents: status.final_price_cents,
        currency: status.currency.clone(),
        payment_status: status.payment_status.clone(),
        eta_seconds: None,
        eta_label: None,
    }
}

/// Drive one job to a terminal, fully revealed state.
pub(crate) async fn poll_job(orch: Orchestrator, local_key: String, job_id: String) {
    let cancel = orch.cancel_token().child_token();
    let config = orch.config().clone();

    if sleep_or_cancel(&cancel, config.first_poll_delay).await {
        return;
    }

    loop {
        let status = match orch.provider().job_status(&job_id).await {
            Ok(status) => status,
            Err(e) => {
                // Transient poll failures stay invisible; the record
                // keeps its simulated progress and we try again.
                tracing::debug!(job_id = %job_id, error = %e, "status poll failed, retrying");
                if sleep_or_cancel(&cancel, config.poll_retry_delay).await {
                    return;
                }
                continue;
            }
        };

        let parsed = RenderStatus::parse(&status.status);
        // Completed without media keeps the record pending on a slower
        // cadence until the URL shows up.
        let media_pending = parsed == RenderStatus::Completed && status.video_url.is_none();
        let effective = if media_pending { None } else { Some(parsed) };
        let patch = patch_from(&status, effective);

        let now = now_ms();
        let Some(render) = orch
            .table()
            .update_by_job_id(&job_id, |r| r.apply_patch(&patch, now))
            .await
        else {
            // Rolled back or cleared by a scope switch.
            return;
        };
        orch.events().publish(OrchestratorEvent::RenderUpdated {
            local_key: local_key.clone(),
        });

        match render.status {
            RenderStatus::Failed => {
                tracing::info!(job_id = %job_id, "job failed");
                orch.persist().await;
                return;
            }
            RenderStatus::Completed => {
                claim_hero(&orch, &render.batch_id, &local_key).await;
                orch.persist().await;
                return;
            }
            RenderStatus::Pending => {
                if render.has_held_result() {
                    release_after_gate(&orch, &cancel, &local_key, render.min_ready_at).await;
                    return;
                }
                let delay = if media_pending {
                    config.media_poll_interval
                } else {
                    config.poll_interval
                };
                if sleep_or_cancel(&cancel, delay).await {
                    return;
                }
            }
        }
    }
}

/// Wait out the reveal gate, then release the held result atomically.
async fn release_after_gate(
    orch: &Orchestrator,
    cancel: &CancellationToken,
    local_key: &str,
    min_ready_at: i64,
) {
    loop {
        let remaining = min_ready_at - now_ms();
        if remaining <= 0 {
            break;
        }
        if sleep_or_cancel(cancel, Duration::from_millis(remaining as u64)).await {
            return;
        }
    }
    let now = now_ms();
    let Some(render) = orch
        .table()
        .update(local_key, |r| {
            r.release_if_due(now);
        })
        .await
    else {
        return;
    };
    if render.status == RenderStatus::Completed {
        orch.events().publish(OrchestratorEvent::RenderUpdated {
            local_key: local_key.to_string(),
        });
        claim_hero(orch, &render.batch_id, local_key).await;
        orch.persist().await;
    }
}

async fn claim_hero(orch: &Orchestrator, batch_id: &str, local_key: &str) {
    if orch.table().assign_hero(batch_id, local_key).await {
        orch.events().publish(OrchestratorEvent::HeroAssigned {
            batch_id: batch_id.to_string(),
            local_key: local_key.to_string(),
        });
    }
}
