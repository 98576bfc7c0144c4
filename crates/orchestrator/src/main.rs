use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelgen_orchestrator::{Config, Orchestrator, OrchestratorEvent};
use reelgen_provider::HttpProvider;
use reelgen_store::LocalStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelgen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base_url = std::env::var("REELGEN_API_URL")
        .map_err(|_| anyhow::anyhow!("REELGEN_API_URL must be set"))?;
    let api_key = std::env::var("REELGEN_API_KEY").ok();
    let data_dir = std::env::var("REELGEN_DATA_DIR").unwrap_or_else(|_| ".reelgen".to_string());

    let prompt: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("usage: reelgen <prompt>");
    }

    let provider = Arc::new(HttpProvider::new(base_url, api_key));
    let store = LocalStore::new(data_dir);
    let orch = Orchestrator::new(provider, store, Config::default());

    orch.refresh_engines().await?;
    orch.resume().await?;
    orch.set_prompt(prompt).await;

    let mut events = orch.subscribe();
    let batch_id = orch.start_render().await?;
    tracing::info!(batch_id = %batch_id, "batch submitted");

    // Log state changes until every member of the batch is terminal.
    loop {
        match events.recv().await {
            Ok(OrchestratorEvent::RenderUpdated { local_key }) => {
                tracing::debug!(local_key = %local_key, "render updated");
            }
            Ok(OrchestratorEvent::HeroAssigned { batch_id, local_key }) => {
                tracing::info!(batch_id = %batch_id, local_key = %local_key, "hero assigned");
            }
            Ok(OrchestratorEvent::TopUpRequired { shortfall_cents }) => {
                tracing::warn!(shortfall_cents, "top-up required");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "event stream closed");
                break;
            }
        }

        let groups = orch.groups().await;
        let done = groups
            .iter()
            .filter(|g| g.batch_id == batch_id)
            .all(|g| g.status != reelgen_core::render::RenderStatus::Pending);
        if done && groups.iter().any(|g| g.batch_id == batch_id) {
            for group in groups.iter().filter(|g| g.batch_id == batch_id) {
                tracing::info!(
                    status = group.status.as_str(),
                    completed = group.completed,
                    failed = group.failed,
                    "batch finished"
                );
                for member in &group.members {
                    if let Some(url) = &member.video_url {
                        tracing::info!(iteration = member.iteration_index, url = %url, "video ready");
                    }
                }
            }
            break;
        }
    }

    orch.shutdown();
    Ok(())
}
