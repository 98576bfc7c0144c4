//! Draft validation and attachment handling: rejected submissions must
//! leave the render table untouched, and schema changes must hand
//! released attachments back to the caller.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{fast_config, image_engine, strict_engine, MockProvider};
use reelgen_core::attachment::Attachment;
use reelgen_core::engine::Mode;
use reelgen_core::error::CoreError;
use reelgen_orchestrator::{Orchestrator, OrchestratorError};
use reelgen_store::LocalStore;

async fn setup(provider: Arc<MockProvider>) -> (Orchestrator, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let orch = Orchestrator::new(provider, LocalStore::new(dir.path()), fast_config());
    orch.refresh_engines().await.unwrap();
    (orch, dir)
}

fn start_image() -> Attachment {
    Attachment {
        field_id: "start_image".to_string(),
        name: "frame.png".to_string(),
        url: "https://cdn.example/frame.png".to_string(),
        content_type: Some("image/png".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_prompt_is_rejected_before_any_record_exists() {
    let provider = Arc::new(MockProvider::new());
    let (orch, _dir) = setup(provider.clone()).await;

    let err = orch.start_render().await.unwrap_err();
    assert_matches!(
        err,
        OrchestratorError::Core(CoreError::Validation(ref msg)) if msg.contains("Prompt")
    );
    assert!(orch.renders().await.is_empty());
    assert!(provider.generated_requests().is_empty());
}

#[tokio::test]
async fn missing_required_image_is_rejected_with_the_field_label() {
    let provider = Arc::new(MockProvider::with_engines(vec![image_engine()]));
    let (orch, _dir) = setup(provider.clone()).await;
    orch.set_prompt("a rusting carousel at dawn").await;
    orch.select_mode(Mode::ImageToVideo).await.unwrap();

    let err = orch.start_render().await.unwrap_err();
    assert_matches!(
        err,
        OrchestratorError::Core(CoreError::Validation(ref msg))
            if msg == "Start image is required"
    );
    assert!(orch.renders().await.is_empty());
    assert!(provider.generated_requests().is_empty());
}

#[tokio::test]
async fn missing_required_negative_prompt_is_rejected() {
    let provider = Arc::new(MockProvider::with_engines(vec![strict_engine()]));
    let (orch, _dir) = setup(provider.clone()).await;
    orch.set_prompt("a rusting carousel at dawn").await;

    let err = orch.start_render().await.unwrap_err();
    assert_matches!(
        err,
        OrchestratorError::Core(CoreError::Validation(ref msg))
            if msg == "Negative prompt is required"
    );
    assert!(orch.renders().await.is_empty());
    assert!(provider.generated_requests().is_empty());

    // Filling it in unblocks submission and it rides the request.
    orch.set_negative_prompt("no text, no watermarks").await;
    orch.start_render().await.unwrap();
    common::wait_until(std::time::Duration::from_secs(2), || async {
        provider.generated_requests().len() == 1
    })
    .await;
    assert_eq!(
        provider.generated_requests()[0].negative_prompt.as_deref(),
        Some("no text, no watermarks")
    );

    orch.shutdown();
}

#[tokio::test]
async fn attached_image_satisfies_validation_and_rides_the_request() {
    let provider = Arc::new(MockProvider::with_engines(vec![image_engine()]));
    let (orch, _dir) = setup(provider.clone()).await;
    orch.set_prompt("a rusting carousel at dawn").await;
    orch.select_mode(Mode::ImageToVideo).await.unwrap();
    orch.add_attachment(start_image()).await.unwrap();

    orch.start_render().await.unwrap();
    common::wait_until(std::time::Duration::from_secs(2), || async {
        provider.generated_requests().len() == 1
    })
    .await;
    let request = &provider.generated_requests()[0];
    assert_eq!(request.attachments.len(), 1);
    assert_eq!(request.attachments[0].field_id, "start_image");
    assert_eq!(request.attachments[0].url, "https://cdn.example/frame.png");
}

// ---------------------------------------------------------------------------
// Schema changes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn switching_modes_releases_attachments_the_schema_dropped() {
    let provider = Arc::new(MockProvider::with_engines(vec![image_engine()]));
    let (orch, _dir) = setup(provider).await;
    orch.select_mode(Mode::ImageToVideo).await.unwrap();
    orch.add_attachment(start_image()).await.unwrap();

    let released = orch.select_mode(Mode::TextToVideo).await.unwrap();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].name, "frame.png");
    assert!(orch.draft().await.attachments.is_empty());
}
