//! Shared render table.
//!
//! All mutation goes through functional updates under one lock so
//! concurrent pollers, tickers, and submissions never interleave
//! half-applied changes. Snapshots are cheap clones; consumers render
//! from those.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use reelgen_core::group::{group_renders, BatchHeroMap, GroupSummary};
use reelgen_core::render::LocalRender;

#[derive(Default)]
struct TableState {
    renders: HashMap<String, LocalRender>,
    /// Insertion order, newest first.
    order: Vec<String>,
    heroes: BatchHeroMap,
}

/// Concurrent table of local renders, cheap to clone and share.
#[derive(Clone, Default)]
pub struct RenderTable {
    state: Arc<RwLock<TableState>>,
}

impl RenderTable {
    /// Insert a new render at the head of the display order.
    pub async fn insert(&self, render: LocalRender) {
        let mut state = self.state.write().await;
        state.order.insert(0, render.local_key.clone());
        state.renders.insert(render.local_key.clone(), render);
    }

    /// Apply a closure to one render. Returns the updated copy, or
    /// `None` when the render no longer exists.
    pub async fn update<F>(&self, local_key: &str, f: F) -> Option<LocalRender>
    where
        F: FnOnce(&mut LocalRender),
    {
        let mut state = self.state.write().await;
        let render = state.renders.get_mut(local_key)?;
        f(render);
        Some(render.clone())
    }

    /// Apply a closure to the render owning a provider job id.
    pub async fn update_by_job_id<F>(&self, job_id: &str, f: F) -> Option<LocalRender>
    where
        F: FnOnce(&mut LocalRender),
    {
        let mut state = self.state.write().await;
        let render = state
            .renders
            .values_mut()
            .find(|r| r.job_id.as_deref() == Some(job_id))?;
        f(render);
        Some(render.clone())
    }

    /// Remove a render. A removed hero hands the slot to the earliest
    /// remaining sibling; when it was the last member of its batch the
    /// batch's hero slot is cleared instead. Returns the removed render.
    pub async fn remove(&self, local_key: &str) -> Option<LocalRender> {
        let mut state = self.state.write().await;
        let removed = state.renders.remove(local_key)?;
        state.order.retain(|k| k != local_key);
        let next = state
            .renders
            .values()
            .filter(|r| r.batch_id == removed.batch_id)
            .min_by_key(|r| (r.created_at, r.iteration_index))
            .map(|r| r.local_key.clone());
        if state.heroes.hero_for(&removed.batch_id) == Some(local_key) {
            state.heroes.clear(&removed.batch_id);
            if let Some(next) = next {
                state.heroes.assign(&removed.batch_id, &next);
            }
        } else if next.is_none() {
            state.heroes.clear(&removed.batch_id);
        }
        Some(removed)
    }

    pub async fn get(&self, local_key: &str) -> Option<LocalRender> {
        self.state.read().await.renders.get(local_key).cloned()
    }

    /// All renders in display order.
    pub async fn snapshot(&self) -> Vec<LocalRender> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|k| state.renders.get(k).cloned())
            .collect()
    }

    /// Claim the hero slot for a batch. First claim wins.
    pub async fn assign_hero(&self, batch_id: &str, local_key: &str) -> bool {
        self.state.write().await.heroes.assign(batch_id, local_key)
    }

    pub async fn heroes(&self) -> BatchHeroMap {
        self.state.read().await.heroes.clone()
    }

    /// Replace the hero map wholesale, used when restoring a session.
    pub async fn restore_heroes(&self, heroes: BatchHeroMap) {
        self.state.write().await.heroes = heroes;
    }

    /// Drop every render and hero, used when switching scopes.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = TableState::default();
    }

    /// Aggregated group rows as of `now_ms`, newest first.
    pub async fn groups(&self, now_ms: i64) -> Vec<GroupSummary> {
        let state = self.state.read().await;
        let renders: Vec<LocalRender> = state
            .order
            .iter()
            .filter_map(|k| state.renders.get(k).cloned())
            .collect();
        group_renders(&renders, &state.heroes, now_ms)
    }
}
