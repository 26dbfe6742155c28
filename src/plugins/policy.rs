//! Bash policy engine: classifies intercepted tool invocations as
//! allow/deny.
//!
//! Classification is regex-based over arbitrary shell text and therefore
//! best-effort: quoting, escaping, and obfuscation defeat it. Hard
//! enforcement belongs to the deny patterns plus host-level permission
//! configuration; this engine is the first, cheap line.

use crate::core::config::GuardConfig;
use crate::core::error::GuardError;
use crate::core::exec;
use crate::core::time::safe_truncate;
use clap::{Parser, Subcommand};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::path::Path;

#[derive(Parser, Debug)]
#[clap(name = "policy", about = "Evaluate the tool-call policy engine")]
pub struct PolicyCli {
    #[clap(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// Evaluate the decision for a would-be tool call.
    Eval {
        /// Tool name as the host would report it (e.g. `bash`).
        #[clap(long, default_value = "bash")]
        tool: String,
        /// Command text for bash-class tools.
        #[clap(long)]
        command: String,
        /// Output machine-readable JSON.
        #[clap(long)]
        json: bool,
    },
}

/// Allow/deny verdict for one intercepted tool call. Transient, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
        }
    }

    pub fn deny(reason: String) -> Self {
        Self {
            allow: false,
            reason: Some(reason),
        }
    }
}

/// Extracts the literal command text from the first populated key among the
/// accepted argument spellings. `None` means the call cannot be evaluated
/// and is allowed (fail open, documented risk).
pub fn command_from_args(args: &JsonMap<String, JsonValue>) -> Option<&str> {
    ["command", "cmd", "shell", "input"]
        .iter()
        .find_map(|key| args.get(*key).and_then(JsonValue::as_str))
}

/// Resolves the branch currently checked out in `cwd`, or `None` when git
/// is unavailable.
pub fn current_branch(cwd: &Path) -> Option<String> {
    let res = exec::run("git rev-parse --abbrev-ref HEAD", cwd);
    if !res.ok {
        return None;
    }
    let branch = res.output.trim().to_string();
    if branch.is_empty() { None } else { Some(branch) }
}

fn matches_ci(pattern: &str, text: &str) -> bool {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Decision for a bash-class invocation.
pub fn decide_bash(
    cfg: &GuardConfig,
    cwd: &Path,
    args: &JsonMap<String, JsonValue>,
) -> Decision {
    let Some(command) = command_from_args(args) else {
        return Decision::allow();
    };

    for pattern in &cfg.block_bash_regex {
        if matches_ci(pattern, command) {
            return Decision::deny(format!(
                "Blocked bash by pattern /{}/: {}",
                pattern,
                safe_truncate(command, 300)
            ));
        }
    }

    if matches_ci(r"\bgit\s+push\b", command) {
        if let Some(branch) = current_branch(cwd) {
            if cfg.protected_branches.contains(&branch) {
                return Decision::deny(format!(
                    "Blocked git push on protected branch '{}'.",
                    branch
                ));
            }
        }
    }

    if matches_ci(r"\bgit\s+reset\b", command) && matches_ci("--hard", command) {
        return Decision::deny("Blocked: git reset --hard is not allowed.".to_string());
    }

    Decision::allow()
}

/// Top-level decision: only bash-class tools are scrutinized; every other
/// tool name is allowed unconditionally. This is not a capability sandbox.
pub fn decide_tool(
    cfg: &GuardConfig,
    cwd: &Path,
    tool_name: &str,
    args: &JsonMap<String, JsonValue>,
) -> Decision {
    if tool_name == "bash" || tool_name.to_lowercase().contains("bash") {
        return decide_bash(cfg, cwd, args);
    }
    Decision::allow()
}

/// Advisory: which configured protected-path patterns the command text
/// mentions. Reported in pre-tool log records, never enforced.
pub fn protected_path_hits(cfg: &GuardConfig, command: &str) -> Vec<String> {
    cfg.protected_paths
        .iter()
        .filter(|pattern| {
            command
                .split_whitespace()
                .any(|word| glob_match(pattern, word.trim_matches(|c| c == '"' || c == '\'')))
        })
        .cloned()
        .collect()
}

/// Simple glob match: `**` spans path segments, a single `*` spans one.
/// Deliberately not a full matcher.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0];
            let suffix = parts[1];
            return (suffix.is_empty() || text.ends_with(suffix) || text.contains(suffix))
                && (prefix.is_empty() || text.starts_with(prefix));
        }
    }

    if pattern.contains('*') {
        let parts: Vec<&str> = pattern.split('*').collect();
        if parts.len() == 2 {
            return text.starts_with(parts[0]) && text.ends_with(parts[1]);
        }
    }

    pattern == text
}

pub fn run_policy_cli(project_root: &Path, cli: PolicyCli) -> Result<(), GuardError> {
    let cfg = crate::core::config::load_config(project_root)?;
    match cli.command {
        PolicyCommand::Eval {
            tool,
            command,
            json,
        } => {
            let mut args = JsonMap::new();
            args.insert("command".to_string(), JsonValue::String(command.clone()));
            let decision = decide_tool(&cfg, project_root, &tool, &args);
            let path_hits = protected_path_hits(&cfg, &command);

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "tool": tool,
                        "decision": decision,
                        "protected_path_hits": path_hits,
                    }))?
                );
            } else {
                use colored::Colorize;
                if decision.allow {
                    println!("{}", "allow".green().bold());
                } else {
                    println!(
                        "{} {}",
                        "deny".red().bold(),
                        decision.reason.as_deref().unwrap_or("")
                    );
                }
                for hit in path_hits {
                    println!("advisory: touches protected path pattern {}", hit);
                }
            }
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "policy",
        "version": "0.1.0",
        "description": "Regex-based allow/deny engine for intercepted tool calls",
        "commands": [
            { "name": "eval", "parameters": ["tool", "command"] }
        ],
        "notes": "Best-effort shell-text classification; hard enforcement is the host's permission config"
    })
}
