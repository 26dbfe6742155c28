//! Validation gate: composes and runs the project's verification pipeline.
//!
//! Prefers a unified `verify` script, else a lint -> typecheck -> unit-test
//! fallback chain, with conditional end-to-end inclusion driven by touched
//! files. The result reports which stage produced the verdict so log
//! consumers can tell a failing e2e stage from a failing lint.

use crate::core::config::E2eMode;
use crate::core::error::GuardError;
use crate::core::exec::{self, ExecResult};
use crate::core::manifest::{self, Runner, chain, has_script, list_scripts, script_cmd};
use clap::{Parser, Subcommand};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(name = "gate", about = "Run the validation gate on demand")]
pub struct GateCli {
    #[clap(subcommand)]
    pub command: GateCommand,
}

#[derive(Subcommand, Debug)]
pub enum GateCommand {
    /// Run the gate against the current project state.
    Run {
        /// E2e mode override: 'never', 'conditional', or 'always'.
        #[clap(long)]
        e2e: Option<String>,
        /// Output machine-readable JSON.
        #[clap(long)]
        json: bool,
    },
    /// List the script names visible in the project manifest.
    Scripts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStage {
    Verify,
    Fallback,
    E2e,
}

impl GateStage {
    pub fn as_str(self) -> &'static str {
        match self {
            GateStage::Verify => "verify",
            GateStage::Fallback => "fallback",
            GateStage::E2e => "e2e",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateOptions {
    pub runner: Runner,
    pub cwd: PathBuf,
    pub e2e_mode: E2eMode,
    pub touched_files: Vec<String>,
    pub e2e_triggers: Vec<Regex>,
}

/// One validation run. `ok` reflects the last stage executed: a green
/// primary stage followed by a red e2e stage is a failed gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub ok: bool,
    pub command: String,
    pub output: String,
    pub code: Option<i32>,
    pub stage: GateStage,
    pub ran_e2e: bool,
    pub scripts_seen: Vec<String>,
}

impl GateResult {
    fn from_exec(res: ExecResult, stage: GateStage, ran_e2e: bool, scripts: Vec<String>) -> Self {
        Self {
            ok: res.ok,
            command: res.command,
            output: res.output,
            code: res.code,
            stage,
            ran_e2e,
            scripts_seen: scripts,
        }
    }
}

/// Compiles trigger patterns, skipping any that fail to parse.
pub fn compile_triggers(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| {
            regex::RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .ok()
        })
        .collect()
}

/// Whether the e2e stage should run, given a passing primary stage.
pub fn should_run_e2e(opt: &GateOptions) -> bool {
    match opt.e2e_mode {
        E2eMode::Always => true,
        E2eMode::Never => false,
        E2eMode::Conditional => {
            let has_e2e = has_script(&opt.cwd, "e2e") || has_script(&opt.cwd, "test:e2e");
            if !has_e2e {
                return false;
            }
            opt.touched_files
                .iter()
                .any(|f| opt.e2e_triggers.iter().any(|re| re.is_match(f)))
        }
    }
}

/// The primary stage command: the `verify` script when present, else the
/// fallback chain with best-guess invocations for missing scripts.
pub fn primary_command(cwd: &Path, runner: Runner) -> (String, GateStage) {
    if has_script(cwd, "verify") {
        return (script_cmd(runner, "verify"), GateStage::Verify);
    }

    let unit = if has_script(cwd, "test:unit") {
        script_cmd(runner, "test:unit")
    } else {
        // `test` when declared, best-guess `test` invocation otherwise.
        script_cmd(runner, "test")
    };
    let cmds = vec![
        script_cmd(runner, "lint"),
        script_cmd(runner, "typecheck"),
        unit,
    ];
    (chain(&cmds), GateStage::Fallback)
}

/// The e2e command: a script literally named `e2e` is preferred over the
/// namespaced `test:e2e` variant.
pub fn e2e_command(cwd: &Path, runner: Runner) -> String {
    if has_script(cwd, "e2e") {
        script_cmd(runner, "e2e")
    } else {
        script_cmd(runner, "test:e2e")
    }
}

/// Runs the gate: primary stage first, then the e2e stage when the primary
/// passed and policy calls for it.
pub fn run_gate(opt: &GateOptions) -> GateResult {
    let scripts_seen = list_scripts(&opt.cwd);

    let (command, stage) = primary_command(&opt.cwd, opt.runner);
    let res = exec::run(&command, &opt.cwd);

    if !(res.ok && should_run_e2e(opt)) {
        return GateResult::from_exec(res, stage, false, scripts_seen);
    }

    let e2e_res = exec::run(&e2e_command(&opt.cwd, opt.runner), &opt.cwd);
    GateResult::from_exec(e2e_res, GateStage::E2e, true, scripts_seen)
}

pub fn run_gate_cli(project_root: &Path, cli: GateCli) -> Result<(), GuardError> {
    let cfg = crate::core::config::load_config(project_root)?;
    match cli.command {
        GateCommand::Run { e2e, json } => {
            let e2e_mode = match e2e.as_deref() {
                None => cfg.gate.e2e_mode,
                Some("never") => E2eMode::Never,
                Some("conditional") => E2eMode::Conditional,
                Some("always") => E2eMode::Always,
                Some(other) => {
                    return Err(GuardError::ValidationError(format!(
                        "unknown e2e mode '{}' (expected never|conditional|always)",
                        other
                    )));
                }
            };

            let state = crate::core::state::load_state(project_root, &cfg.state_dir);
            let opt = GateOptions {
                runner: manifest::detect_runner(project_root),
                cwd: project_root.to_path_buf(),
                e2e_mode,
                touched_files: state.touched_files.iter().cloned().collect(),
                e2e_triggers: compile_triggers(&cfg.gate.e2e_triggers),
            };
            let res = run_gate(&opt);

            if json {
                println!("{}", serde_json::to_string_pretty(&res)?);
            } else {
                use colored::Colorize;
                let verdict = if res.ok {
                    "gate passed".green().bold()
                } else {
                    "gate failed".red().bold()
                };
                println!("{} (stage: {})", verdict, res.stage.as_str());
                println!("command: {}", res.command);
                if !res.ok {
                    println!("{}", res.output);
                }
            }
            if !res.ok {
                return Err(GuardError::ValidationError(format!(
                    "validation gate failed at stage '{}'",
                    res.stage.as_str()
                )));
            }
        }
        GateCommand::Scripts => {
            for name in list_scripts(project_root) {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "gate",
        "version": "0.1.0",
        "description": "Validation pipeline runner: verify script, lint/typecheck/test fallback, conditional e2e",
        "commands": [
            { "name": "run", "parameters": ["e2e", "json"] },
            { "name": "scripts", "parameters": [] }
        ],
        "stages": ["verify", "fallback", "e2e"]
    })
}
