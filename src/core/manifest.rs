//! Project manifest inspection: which script runner is in effect and which
//! named scripts exist.
//!
//! Detection is advisory. It only selects the invocation style the gate
//! uses; a missing or unparseable `package.json` means "no scripts", never
//! an error.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner {
    Bun,
    Pnpm,
}

impl Runner {
    pub fn as_str(self) -> &'static str {
        match self {
            Runner::Bun => "bun",
            Runner::Pnpm => "pnpm",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub scripts: FxHashMap<String, String>,
    #[serde(rename = "packageManager")]
    pub package_manager: Option<String>,
}

pub fn read_manifest(cwd: &Path) -> Option<PackageManifest> {
    let path = cwd.join("package.json");
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

pub fn detect_runner(cwd: &Path) -> Runner {
    if let Some(manifest) = read_manifest(cwd) {
        if manifest
            .package_manager
            .as_deref()
            .is_some_and(|pm| pm.starts_with("bun@"))
        {
            return Runner::Bun;
        }
    }
    if cwd.join("bun.lockb").exists() {
        return Runner::Bun;
    }
    Runner::Pnpm
}

pub fn has_script(cwd: &Path, name: &str) -> bool {
    read_manifest(cwd).is_some_and(|m| m.scripts.contains_key(name))
}

pub fn list_scripts(cwd: &Path) -> Vec<String> {
    let mut names: Vec<String> = read_manifest(cwd)
        .map(|m| m.scripts.into_keys().collect())
        .unwrap_or_default();
    names.sort();
    names
}

/// Renders the runner invocation for a named script.
pub fn script_cmd(runner: Runner, script: &str) -> String {
    match runner {
        Runner::Bun => format!("bun run {}", script),
        Runner::Pnpm => format!("pnpm -s {}", script),
    }
}

/// Joins commands so the chain short-circuits on first failure.
pub fn chain(cmds: &[String]) -> String {
    cmds.join(" && ")
}
