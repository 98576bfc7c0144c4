//! File-backed session store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reelgen_core::form::FormState;
use reelgen_core::group::BatchHeroMap;
use reelgen_core::render::{LocalRender, RenderStatus};
use reelgen_core::wallet::MemberTier;

use crate::scope::StorageScope;

// ---------------------------------------------------------------------------
// Limits and versioning
// ---------------------------------------------------------------------------

/// Most renders kept per scope; older ones fall off the end.
pub const MAX_PERSISTED_RENDERS: usize = 40;
/// Render entry format version. Entries with another version are
/// discarded on load.
pub const RENDER_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("storage serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Everything persisted for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub prompt: String,
    pub negative_prompt: String,
    pub form: Option<FormState>,
    pub member_tier: MemberTier,
    pub renders: Vec<LocalRender>,
    pub heroes: BatchHeroMap,
}

/// On-disk shape. Render entries stay raw JSON so one malformed entry
/// cannot fail the whole load.
#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    negative_prompt: String,
    #[serde(default)]
    form: Option<FormState>,
    #[serde(default)]
    member_tier: MemberTier,
    #[serde(default)]
    renders: Vec<serde_json::Value>,
    #[serde(default)]
    heroes: BatchHeroMap,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRender {
    version: u32,
    #[serde(flatten)]
    render: LocalRender,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// JSON-file session store rooted at one directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, scope: &StorageScope) -> PathBuf {
        self.root.join(format!("session-{}.json", scope.key()))
    }

    /// Load the session for a scope. A missing or unreadable file
    /// yields an empty session; individual malformed render entries
    /// are dropped with a warning.
    pub fn load(&self, scope: &StorageScope) -> SessionState {
        let path = self.path_for(scope);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return SessionState::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read session file");
                return SessionState::default();
            }
        };
        let file: SessionFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "discarding malformed session file");
                return SessionState::default();
            }
        };

        let mut renders = Vec::new();
        for entry in file.renders {
            match serde_json::from_value::<PersistedRender>(entry) {
                Ok(p) if p.version == RENDER_VERSION => renders.push(p.render),
                Ok(p) => {
                    tracing::warn!(version = p.version, "discarding render with unknown version");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discarding malformed render entry");
                }
            }
        }

        SessionState {
            prompt: file.prompt,
            negative_prompt: file.negative_prompt,
            form: file.form,
            member_tier: file.member_tier,
            renders,
            heroes: file.heroes,
        }
    }

    /// Persist the session for a scope.
    ///
    /// Only renders that can still be resumed are kept: pending records
    /// with a known job id, newest first, capped at
    /// [`MAX_PERSISTED_RENDERS`]. Terminal and never-submitted records
    /// are dropped.
    pub fn save(&self, scope: &StorageScope, state: &SessionState) -> Result<(), StoreError> {
        let mut resumable: Vec<&LocalRender> = state
            .renders
            .iter()
            .filter(|r| r.status == RenderStatus::Pending && r.job_id.is_some())
            .collect();
        resumable.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        resumable.truncate(MAX_PERSISTED_RENDERS);

        let renders = resumable
            .into_iter()
            .map(|render| {
                serde_json::to_value(PersistedRender {
                    version: RENDER_VERSION,
                    render: render.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let file = SessionFile {
            prompt: state.prompt.clone(),
            negative_prompt: state.negative_prompt.clone(),
            form: state.form.clone(),
            member_tier: state.member_tier,
            renders,
            heroes: state.heroes.clone(),
        };

        fs::create_dir_all(&self.root)?;
        let path = self.path_for(scope);
        write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
        Ok(())
    }

    /// Move the anonymous session over to a user scope on sign-in.
    ///
    /// A user who already has a persisted session keeps it; the
    /// anonymous file is removed either way so a later sign-out starts
    /// clean.
    pub fn adopt_anonymous(&self, user: &StorageScope) -> Result<(), StoreError> {
        let anon_path = self.path_for(&StorageScope::Anonymous);
        if !anon_path.exists() {
            return Ok(());
        }
        let user_path = self.path_for(user);
        if user_path.exists() {
            fs::remove_file(&anon_path)?;
            return Ok(());
        }
        fs::rename(&anon_path, &user_path)?;
        Ok(())
    }

    /// Remove everything persisted for a scope.
    pub fn clear(&self, scope: &StorageScope) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(scope)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write via a sibling temp file and rename so readers never observe a
/// partially written session.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
