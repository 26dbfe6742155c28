//! Persisted guard state: run identity, retry cycle counter, and the set of
//! files touched since the last green gate.
//!
//! Load is tolerant: a missing, unreadable, or malformed state file yields a
//! fresh default rather than an error. Every mutation site persists via
//! [`save_state`], pretty-printed, so the state survives process restarts.

use crate::core::error::GuardError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const STATE_FILE: &str = "guard_state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuardState {
    /// Opaque id minted when a fresh state is created, preserved across
    /// reloads.
    pub run_id: String,
    /// Consecutive gate failures since the last pass; exactly 0 after any
    /// pass.
    pub cycle_id: u32,
    /// Repository-relative paths modified since the last green gate.
    /// Set semantics: duplicates collapse, order is not significant.
    pub touched_files: BTreeSet<String>,
    pub last_gate_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_gate_at: Option<String>,
}

impl Default for GuardState {
    fn default() -> Self {
        Self {
            run_id: time::new_run_id(),
            cycle_id: 0,
            touched_files: BTreeSet::new(),
            last_gate_ok: true,
            last_gate_at: None,
        }
    }
}

fn state_file(project_root: &Path, state_dir: &str) -> PathBuf {
    project_root.join(state_dir).join(STATE_FILE)
}

/// Loads persisted state, degrading to a fresh default on any read or parse
/// failure.
pub fn load_state(project_root: &Path, state_dir: &str) -> GuardState {
    let file = state_file(project_root, state_dir);
    if !file.exists() {
        return GuardState::default();
    }
    match fs::read_to_string(&file) {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        Err(_) => GuardState::default(),
    }
}

pub fn save_state(
    project_root: &Path,
    state_dir: &str,
    state: &GuardState,
) -> Result<(), GuardError> {
    let file = state_file(project_root, state_dir);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file, serde_json::to_string_pretty(state)?)?;
    Ok(())
}

pub fn add_touched_files<I, S>(state: &mut GuardState, files: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for f in files {
        state.touched_files.insert(f.into());
    }
}

pub fn clear_touched_files(state: &mut GuardState) {
    state.touched_files.clear();
}
