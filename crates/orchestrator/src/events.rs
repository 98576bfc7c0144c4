//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Every externally observable state change in the orchestrator is
//! published here so consumers can re-render without polling the table.

use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A state change consumers should react to.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// A batch of iterations was accepted and its records inserted.
    BatchStarted { batch_id: String, count: u32 },
    /// A render changed: progress, status, merged fields, or release.
    RenderUpdated { local_key: String },
    /// A render was rolled back and removed from the table.
    RenderRemoved { local_key: String },
    /// A member claimed the hero slot of its batch.
    HeroAssigned { batch_id: String, local_key: String },
    /// The wallet cannot cover a submission; a top-up prompt opened.
    TopUpRequired { shortfall_cents: i64 },
    /// A checkout session is ready; the caller must open the URL.
    TopUpCheckout { url: String },
    /// A user-visible notice (a failure message, a dismissal).
    Notice { message: String },
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// Fan-out bus for [`OrchestratorEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity. Slow receivers
    /// observe `RecvError::Lagged` when the buffer wraps.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. With zero subscribers the
    /// event is dropped, which is fine: the table holds the state.
    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
