//! Guard configuration loaded from `.opencode/closed-loop-guard.json`.
//!
//! Every field carries a serde default, so a partial on-disk config is
//! repaired field-by-field; a wholesale-malformed file falls back to the
//! full default set. Loading never fails.

use crate::core::error::GuardError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_RELPATH: &str = ".opencode/closed-loop-guard.json";

/// How end-to-end tests participate in the validation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum E2eMode {
    Never,
    Conditional,
    Always,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateConfig {
    /// Retry ceiling for consecutive gate failures, clamped to 1..=50.
    pub max_cycles: u32,
    pub e2e_mode: E2eMode,
    /// Regexes matched against touched file paths for conditional e2e.
    pub e2e_triggers: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_cycles: 5,
            e2e_mode: E2eMode::Conditional,
            e2e_triggers: vec![
                "^apps/web/".to_string(),
                "^apps/api/".to_string(),
                "^src/auth/".to_string(),
                "payment".to_string(),
                "checkout".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GuardConfig {
    /// Branches on which `git push` is refused.
    pub protected_branches: Vec<String>,
    /// Glob-ish patterns, advisory only. Checked best-effort and logged;
    /// hard enforcement belongs to bash deny patterns plus host-level
    /// permission config.
    pub protected_paths: Vec<String>,
    /// Regexes tested (case-insensitively) against bash commands; first
    /// match denies.
    pub block_bash_regex: Vec<String>,
    pub log_dir: String,
    pub state_dir: String,
    pub gate: GateConfig,
    /// Reserved: fast lint/typecheck after edits. Accepted but not acted on.
    pub micro_validate: bool,
    /// When true, a gate pass is announced through the host app log.
    pub announce_pass: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            protected_branches: vec![
                "main".to_string(),
                "master".to_string(),
                "production".to_string(),
            ],
            protected_paths: vec![
                "**/.env".to_string(),
                "**/.env.*".to_string(),
                "**/.git/**".to_string(),
            ],
            block_bash_regex: vec![
                r"\brm\s+-rf\b".to_string(),
                r"\bsudo\b".to_string(),
                r"\bchmod\s+777\b".to_string(),
                r"\bmkfs\b".to_string(),
                r"\bdd\b".to_string(),
                r"\bshutdown\b".to_string(),
                r"\breboot\b".to_string(),
            ],
            log_dir: ".opencode/logs".to_string(),
            state_dir: ".opencode/state".to_string(),
            gate: GateConfig::default(),
            micro_validate: true,
            announce_pass: true,
        }
    }
}

impl GuardConfig {
    pub fn log_dir_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.log_dir)
    }

    pub fn state_dir_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.state_dir)
    }
}

/// Loads the guard config, repairing missing or invalid fields with schema
/// defaults, and ensures the log/state directories exist.
pub fn load_config(project_root: &Path) -> Result<GuardConfig, GuardError> {
    let path = project_root.join(CONFIG_RELPATH);
    let mut cfg = if path.exists() {
        match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<GuardConfig>(&raw).unwrap_or_default(),
            Err(_) => GuardConfig::default(),
        }
    } else {
        GuardConfig::default()
    };

    cfg.gate.max_cycles = cfg.gate.max_cycles.clamp(1, 50);

    fs::create_dir_all(cfg.log_dir_path(project_root))?;
    fs::create_dir_all(cfg.state_dir_path(project_root))?;
    Ok(cfg)
}
