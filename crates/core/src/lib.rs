//! Pure domain logic for the generation job orchestrator.
//!
//! Everything in this crate is synchronous and side-effect free: capability
//! resolution, render lifecycle math (reveal gating, simulated progress),
//! batch/group aggregation, attachment slot bookkeeping, and wallet
//! shortfall arithmetic. Async orchestration lives in
//! `reelgen-orchestrator`; collaborator wire types in `reelgen-provider`.

pub mod attachment;
pub mod engine;
pub mod error;
pub mod eta;
pub mod form;
pub mod group;
pub mod render;
pub mod wallet;
