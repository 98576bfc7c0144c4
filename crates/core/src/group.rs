//! Batch aggregation: grouping sibling renders, hero selection, and
//! gate-aware summary rows.
//!
//! Sibling iterations of one submission are presented as a single group
//! row. Grouping keys prefer the provider's group id, then the client
//! batch id, then the render's own key so a lone record still renders.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::form::{MAX_ITERATIONS, MIN_ITERATIONS};
use crate::render::{LocalRender, RenderStatus, PROGRESS_CEILING};

// ---------------------------------------------------------------------------
// Hero map
// ---------------------------------------------------------------------------

/// Remembered hero picks per batch.
///
/// The slot is claimed for the first member created in a batch and
/// kept; later claims never displace it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchHeroMap {
    entries: HashMap<String, String>,
}

impl BatchHeroMap {
    /// Record a hero for a batch. Returns whether the slot was claimed;
    /// an already-claimed batch is left untouched.
    pub fn assign(&mut self, batch_id: &str, local_key: &str) -> bool {
        if self.entries.contains_key(batch_id) {
            return false;
        }
        self.entries
            .insert(batch_id.to_string(), local_key.to_string());
        true
    }

    pub fn hero_for(&self, batch_id: &str) -> Option<&str> {
        self.entries.get(batch_id).map(String::as_str)
    }

    pub fn clear(&mut self, batch_id: &str) {
        self.entries.remove(batch_id);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Group summaries
// ---------------------------------------------------------------------------

/// One member of a group row, with gating already applied to the
/// status and progress it displays.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub local_key: String,
    pub job_id: Option<String>,
    pub iteration_index: u32,
    pub status: RenderStatus,
    pub progress: u8,
    pub video_url: Option<String>,
    pub thumb_url: Option<String>,
}

/// Aggregated view of one batch of sibling renders.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: String,
    pub batch_id: String,
    pub group_id: Option<String>,
    /// Expected iteration count, clamped to the batch limits.
    pub count: u32,
    pub members: Vec<GroupMember>,
    /// Previews shown in the row, at most `count` of them.
    pub previews: Vec<GroupMember>,
    pub hero_key: Option<String>,
    pub status: RenderStatus,
    pub progress: u8,
    pub completed: u32,
    pub failed: u32,
    /// Total price across the batch, scaled up when only some members
    /// have been priced so far.
    pub total_price_cents: Option<i64>,
    pub currency: Option<String>,
    pub prompt: String,
    pub engine_label: String,
    pub created_at: i64,
}

fn group_key(render: &LocalRender) -> String {
    render
        .group_id
        .clone()
        .unwrap_or_else(|| render.batch_id.clone())
}

fn display_member(render: &LocalRender, now_ms: i64) -> GroupMember {
    let gated = render.gating_active(now_ms);
    let (status, progress, video_url) = if gated {
        (
            RenderStatus::Pending,
            render.progress.min(PROGRESS_CEILING),
            None,
        )
    } else {
        (render.status, render.progress, render.video_url.clone())
    };
    GroupMember {
        local_key: render.local_key.clone(),
        job_id: render.job_id.clone(),
        iteration_index: render.iteration_index,
        status,
        progress,
        video_url,
        thumb_url: render.thumb_url.clone(),
    }
}

/// Pick the hero member: a recorded pick first, then the first member
/// with a visible video, then the first by iteration index.
fn pick_hero(members: &[GroupMember], recorded: Option<&str>) -> Option<String> {
    if let Some(key) = recorded {
        if members.iter().any(|m| m.local_key == key) {
            return Some(key.to_string());
        }
    }
    members
        .iter()
        .find(|m| m.video_url.is_some())
        .or_else(|| members.first())
        .map(|m| m.local_key.clone())
}

/// Scale partial pricing up to the expected batch size.
///
/// With every member priced the sum is exact; with only some priced,
/// the average price so far is extrapolated across the full count.
fn batch_price(renders: &[&LocalRender], count: u32) -> Option<i64> {
    let priced: Vec<i64> = renders.iter().filter_map(|r| r.price_cents).collect();
    if priced.is_empty() {
        return None;
    }
    let sum: i64 = priced.iter().sum();
    if priced.len() as u32 >= count {
        return Some(sum);
    }
    let avg = sum as f64 / priced.len() as f64;
    Some((avg * count as f64).round() as i64)
}

/// Aggregate renders into group rows, newest submission first.
pub fn group_renders(
    renders: &[LocalRender],
    heroes: &BatchHeroMap,
    now_ms: i64,
) -> Vec<GroupSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<&LocalRender>> = HashMap::new();
    for render in renders {
        let key = group_key(render);
        let bucket = buckets.entry(key.clone()).or_default();
        if bucket.is_empty() {
            order.push(key);
        }
        bucket.push(render);
    }

    let mut summaries: Vec<GroupSummary> = order
        .into_iter()
        .map(|key| {
            let bucket = &buckets[&key];
            summarize_group(key, bucket, heroes, now_ms)
        })
        .collect();
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    summaries
}

fn summarize_group(
    key: String,
    bucket: &[&LocalRender],
    heroes: &BatchHeroMap,
    now_ms: i64,
) -> GroupSummary {
    let declared = bucket.iter().map(|r| r.iteration_count).max().unwrap_or(1);
    let observed = bucket.len() as u32;
    let count = declared.max(observed).clamp(MIN_ITERATIONS, MAX_ITERATIONS);

    let mut members: Vec<GroupMember> =
        bucket.iter().map(|r| display_member(r, now_ms)).collect();
    members.sort_by_key(|m| m.iteration_index);

    let completed = members
        .iter()
        .filter(|m| m.status == RenderStatus::Completed)
        .count() as u32;
    let failed = members
        .iter()
        .filter(|m| m.status == RenderStatus::Failed)
        .count() as u32;

    // A group reads as terminal only once every expected member is.
    let status = if completed >= count {
        RenderStatus::Completed
    } else if failed >= count {
        RenderStatus::Failed
    } else if completed + failed >= count {
        RenderStatus::Completed
    } else {
        RenderStatus::Pending
    };

    // Average over the expected count, so members not yet observed
    // drag the group's bar down instead of inflating it.
    let progress_sum: u32 = members.iter().map(|m| m.progress as u32).sum();
    let progress = match status {
        RenderStatus::Pending => ((progress_sum / count.max(1)) as u8).min(PROGRESS_CEILING),
        _ => 100,
    };

    let batch_id = bucket
        .first()
        .map(|r| r.batch_id.clone())
        .unwrap_or_else(|| key.clone());
    let hero_key = pick_hero(&members, heroes.hero_for(&batch_id));
    let created_at = bucket.iter().map(|r| r.created_at).min().unwrap_or(0);
    let previews: Vec<GroupMember> = members.iter().take(count as usize).cloned().collect();

    GroupSummary {
        group_id: bucket.iter().find_map(|r| r.group_id.clone()),
        count,
        total_price_cents: batch_price(bucket, count),
        currency: bucket.iter().find_map(|r| r.currency.clone()),
        prompt: bucket.first().map(|r| r.prompt.clone()).unwrap_or_default(),
        engine_label: bucket
            .first()
            .map(|r| r.engine_label.clone())
            .unwrap_or_default(),
        key,
        batch_id,
        members,
        previews,
        hero_key,
        status,
        progress,
        completed,
        failed,
        created_at,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
