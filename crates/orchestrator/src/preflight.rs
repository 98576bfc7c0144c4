//! Debounced price quoting.
//!
//! Form edits arrive in bursts; each quote request supersedes the one
//! before it. A request that has been superseded by the time its
//! debounce elapses (or its response lands) resolves to `None` instead
//! of delivering a stale price.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reelgen_provider::types::{PreflightRequest, PreflightResponse};
use reelgen_provider::{ProviderError, RenderProvider};

pub struct PreflightProxy {
    provider: Arc<dyn RenderProvider>,
    debounce: Duration,
    seq: AtomicU64,
}

impl PreflightProxy {
    pub fn new(provider: Arc<dyn RenderProvider>, debounce: Duration) -> Self {
        Self {
            provider,
            debounce,
            seq: AtomicU64::new(0),
        }
    }

    /// Quote a prospective submission. Returns `Ok(None)` when a newer
    /// quote request superseded this one.
    pub async fn quote(
        &self,
        req: &PreflightRequest,
    ) -> Result<Option<PreflightResponse>, ProviderError> {
        let ticket = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.debounce).await;
        if self.seq.load(Ordering::SeqCst) != ticket {
            return Ok(None);
        }
        let response = self.provider.preflight(req).await?;
        if self.seq.load(Ordering::SeqCst) != ticket {
            return Ok(None);
        }
        Ok(Some(response))
    }

    /// Invalidate any in-flight quote without starting a new one.
    pub fn invalidate(&self) {
        self.seq.fetch_add(1, Ordering::SeqCst);
    }
}
