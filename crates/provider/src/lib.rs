//! Wire types and HTTP client for the generation provider.
//!
//! Everything speaks camelCase JSON. The [`client::RenderProvider`]
//! trait is the seam the orchestrator depends on; tests swap in an
//! in-process implementation.

pub mod client;
pub mod error;
pub mod types;

pub use client::{HttpProvider, RenderProvider};
pub use error::ProviderError;
