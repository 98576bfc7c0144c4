//! Orchestrator errors.

use reelgen_core::error::CoreError;
use reelgen_provider::ProviderError;
use reelgen_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The wallet cannot cover the submission. No records were created;
    /// a top-up prompt has been opened.
    #[error("insufficient funds: {required_cents} cents required, {balance_cents} available")]
    InsufficientFunds {
        required_cents: i64,
        balance_cents: i64,
    },

    /// A top-up prompt is open; submissions are blocked until it is
    /// resolved or dismissed.
    #[error("a top-up prompt is open")]
    TopUpOpen,

    /// The referenced engine is not in the current capability list.
    #[error("unknown engine: {0}")]
    UnknownEngine(String),
}
