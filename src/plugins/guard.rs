//! Session guard: the hook handlers and the bounded retry state machine.
//!
//! Three host events drive everything. `tool.execute.before` consults the
//! policy engine and aborts denied calls. `tool.execute.after` records which
//! files the tool touched. `session.idle` runs the validation gate and loops
//! the agent on failures, escalating to the user once the retry budget is
//! spent.

use crate::core::config::{self, GuardConfig};
use crate::core::error::GuardError;
use crate::core::exec;
use crate::core::log::LogSinks;
use crate::core::manifest;
use crate::core::state::{self, GuardState};
use crate::core::time::{now_epoch_z, safe_truncate};
use crate::plugins::gate::{self, GateOptions, GateResult, GateStage};
use crate::plugins::policy::{self, Decision};
use clap::{Parser, Subcommand};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Output truncation budgets: log records keep more context than session
/// prompts.
const LOG_OUTPUT_MAX: usize = 6000;
const PROMPT_OUTPUT_MAX: usize = 2000;

/// Host capabilities consumed by the guard: an application log line and a
/// fire-and-forget prompt injected into the agent session.
pub trait HostSession {
    fn app_log(&self, message: &str);
    fn prompt(&self, text: &str);
}

/// What one idle evaluation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Nothing changed since the last green gate; no gate run, no log noise.
    Skipped,
    Passed {
        stage: GateStage,
    },
    /// Gate failed within budget; a corrective prompt was issued.
    Retry {
        attempt: u32,
        max: u32,
    },
    /// Retry budget exhausted; the user was asked to take over.
    Escalated {
        attempts: u32,
    },
}

/// Total event-payload parser: tool name and argument map with safe
/// sentinels for anything unresolved. Hosts ship loosely-shaped payloads,
/// sometimes nested under `input`.
pub fn parse_event(event: &JsonValue) -> (String, JsonMap<String, JsonValue>) {
    let tool = event
        .get("tool")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            event
                .get("input")
                .and_then(|i| i.get("tool"))
                .and_then(JsonValue::as_str)
        })
        .unwrap_or("unknown")
        .to_string();

    let args = event
        .get("args")
        .and_then(JsonValue::as_object)
        .or_else(|| {
            event
                .get("input")
                .and_then(|i| i.get("args"))
                .and_then(JsonValue::as_object)
        })
        .cloned()
        .unwrap_or_default();

    (tool, args)
}

/// Files modified in the working tree, per version control. A failing or
/// absent `git` yields an empty set, never an error.
pub fn touched_files_from_git(cwd: &Path) -> Vec<String> {
    let res = exec::run("git diff --name-only", cwd);
    if !res.ok {
        return Vec::new();
    }
    res.output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Pure state transition for one gate verdict. Pass resets the failure
/// streak and clears touched files atomically; fail increments the cycle
/// counter and picks retry or escalation against the budget.
pub fn apply_gate_result(
    state: &mut GuardState,
    result: &GateResult,
    max_cycles: u32,
) -> IdleOutcome {
    if result.ok {
        state.last_gate_ok = true;
        state.last_gate_at = Some(now_epoch_z());
        state.cycle_id = 0;
        state::clear_touched_files(state);
        return IdleOutcome::Passed {
            stage: result.stage,
        };
    }

    state.last_gate_ok = false;
    state.cycle_id += 1;
    if state.cycle_id > max_cycles {
        IdleOutcome::Escalated {
            attempts: max_cycles,
        }
    } else {
        IdleOutcome::Retry {
            attempt: state.cycle_id,
            max: max_cycles,
        }
    }
}

/// One plugin activation: loaded config, live state, and the log sinks.
/// Owns the only mutable copy of the guard state; every mutation persists.
pub struct Guard {
    root: PathBuf,
    cfg: GuardConfig,
    state: GuardState,
    sinks: LogSinks,
}

impl Guard {
    pub fn activate(project_root: &Path) -> Result<Self, GuardError> {
        let cfg = config::load_config(project_root)?;
        let state = state::load_state(project_root, &cfg.state_dir);
        let sinks = LogSinks::new(&cfg.log_dir_path(project_root));
        Ok(Self {
            root: project_root.to_path_buf(),
            cfg,
            state,
            sinks,
        })
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    fn persist(&self) -> Result<(), GuardError> {
        state::save_state(&self.root, &self.cfg.state_dir, &self.state)
    }

    fn base_record(&self, event: &str) -> JsonValue {
        json!({
            "ts": now_epoch_z(),
            "run_id": self.state.run_id,
            "cycle_id": self.state.cycle_id,
            "event": event,
        })
    }

    fn record_with(&self, event: &str, extra: JsonValue) -> JsonValue {
        let mut base = self.base_record(event);
        if let (Some(obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in extra_obj {
                obj.insert(k.clone(), v.clone());
            }
        }
        base
    }

    /// `tool.execute.before`: policy decision for the pending tool call.
    ///
    /// On deny the decision is logged, `output.abort` is set on the event
    /// payload when the host exposes an output object, and the returned
    /// decision carries the reason. Hosts that abort via error should treat
    /// `allow == false` as one; the CLI maps it to a non-zero exit. Both
    /// abort paths are served for host-version compatibility.
    pub fn on_tool_before(
        &mut self,
        event: &mut JsonValue,
    ) -> Result<Decision, GuardError> {
        let (tool, args) = parse_event(event);
        let started = Instant::now();

        let decision = policy::decide_tool(&self.cfg, &self.root, &tool, &args);
        let path_hits = policy::command_from_args(&args)
            .map(|cmd| policy::protected_path_hits(&self.cfg, cmd))
            .unwrap_or_default();

        self.sinks.tool_pre.write(&self.record_with(
            "tool.execute.before",
            json!({
                "tool": tool,
                "decision": decision,
                "args": args,
                "protected_path_hits": path_hits,
            }),
        ));

        if !decision.allow {
            let reason = decision
                .reason
                .clone()
                .unwrap_or_else(|| "Blocked by closed-loop policy".to_string());

            self.sinks.events.write(&self.record_with(
                "blocked",
                json!({
                    "tool": tool,
                    "reason": reason,
                    "duration_ms": started.elapsed().as_millis() as u64,
                }),
            ));

            if let Some(output) = event.get_mut("output").and_then(JsonValue::as_object_mut) {
                output.insert("abort".to_string(), JsonValue::String(reason));
            }
        }

        Ok(decision)
    }

    /// `tool.execute.after`: fold the working-tree diff into the touched
    /// set and persist.
    pub fn on_tool_after(&mut self, event: &JsonValue) -> Result<(), GuardError> {
        let (tool, args) = parse_event(event);

        let touched = touched_files_from_git(&self.root);
        if !touched.is_empty() {
            state::add_touched_files(&mut self.state, touched.iter().cloned());
        }

        self.sinks.tool_post.write(&self.record_with(
            "tool.execute.after",
            json!({
                "tool": tool,
                "args": args,
                "touched_files": touched,
            }),
        ));

        self.persist()
    }

    /// `session.idle`: run the validation gate and drive the retry loop.
    pub fn on_session_idle(
        &mut self,
        host: &dyn HostSession,
    ) -> Result<IdleOutcome, GuardError> {
        // Nothing changed since the last green gate: stay quiet.
        if self.state.touched_files.is_empty() && self.state.last_gate_ok {
            return Ok(IdleOutcome::Skipped);
        }

        let runner = manifest::detect_runner(&self.root);
        let opt = GateOptions {
            runner,
            cwd: self.root.clone(),
            e2e_mode: self.cfg.gate.e2e_mode,
            touched_files: self.state.touched_files.iter().cloned().collect(),
            e2e_triggers: gate::compile_triggers(&self.cfg.gate.e2e_triggers),
        };

        self.sinks.stop_gate.write(&self.record_with(
            "stop_gate.start",
            json!({
                "runner": runner.as_str(),
                "touched_files": self.state.touched_files,
            }),
        ));

        let res = gate::run_gate(&opt);

        self.sinks.validation.write(&self.record_with(
            "validation",
            json!({
                "ok": res.ok,
                "stage": res.stage.as_str(),
                "ran_e2e": res.ran_e2e,
                "command": res.command,
                "output": safe_truncate(&res.output, LOG_OUTPUT_MAX),
                "scripts_seen": res.scripts_seen,
            }),
        ));

        let outcome = apply_gate_result(&mut self.state, &res, self.cfg.gate.max_cycles);
        self.persist()?;

        match &outcome {
            IdleOutcome::Passed { stage } => {
                self.sinks.stop_gate.write(&self.record_with(
                    "stop_gate.pass",
                    json!({
                        "stage": stage.as_str(),
                        "ran_e2e": res.ran_e2e,
                    }),
                ));
                if self.cfg.announce_pass {
                    host.app_log("[closed-loop] gate passed");
                }
            }
            IdleOutcome::Retry { attempt, max } => {
                self.sinks.stop_gate.write(&self.record_with(
                    "stop_gate.fail",
                    json!({
                        "stage": res.stage.as_str(),
                        "command": res.command,
                    }),
                ));
                host.prompt(&format!(
                    "Validation gate failed (attempt {}/{}).\n\n\
                     Command:\n{}\n\n\
                     Errors:\n{}\n\n\
                     Rules:\n\
                     - Fix the failures.\n\
                     - Re-run the correct validation command(s).\n\
                     - Do NOT claim completion until the gate passes.\n",
                    attempt,
                    max,
                    res.command,
                    safe_truncate(&res.output, PROMPT_OUTPUT_MAX),
                ));
            }
            IdleOutcome::Escalated { attempts } => {
                self.sinks.stop_gate.write(&self.record_with(
                    "stop_gate.fail",
                    json!({
                        "stage": res.stage.as_str(),
                        "command": res.command,
                    }),
                ));
                host.prompt(&format!(
                    "Validation gate keeps failing after {} attempts.\n\n\
                     Last command: {}\n\n\
                     Please review the error and decide next steps:\n\n{}",
                    attempts,
                    res.command,
                    safe_truncate(&res.output, PROMPT_OUTPUT_MAX),
                ));
            }
            IdleOutcome::Skipped => {}
        }

        Ok(outcome)
    }
}

// ===== CLI surface =====

#[derive(Parser, Debug)]
#[clap(name = "hook", about = "Handle a host hook event")]
pub struct HookCli {
    #[clap(subcommand)]
    pub command: HookCommand,
}

#[derive(Subcommand, Debug)]
pub enum HookCommand {
    /// Handle `tool.execute.before`; exits non-zero when the call is denied.
    Pre {
        /// Event payload JSON (read from stdin when omitted).
        #[clap(long)]
        event: Option<String>,
    },
    /// Handle `tool.execute.after`.
    Post {
        /// Event payload JSON (read from stdin when omitted).
        #[clap(long)]
        event: Option<String>,
    },
    /// Handle `session.idle`; corrective/escalation prompts go to stdout.
    Idle,
}

#[derive(Parser, Debug)]
#[clap(name = "state", about = "Inspect or reset persisted guard state")]
pub struct StateCli {
    #[clap(subcommand)]
    pub command: StateCommand,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Print the persisted guard state.
    Show,
    /// Replace the guard state with a fresh default (new run id).
    Reset,
}

/// Host adapter for the hook CLI: prompts go to stdout (the host injects
/// them into the session), app-log lines to stderr.
pub struct CliHost;

impl HostSession for CliHost {
    fn app_log(&self, message: &str) {
        eprintln!("{}", message);
    }

    fn prompt(&self, text: &str) {
        println!("{}", text);
    }
}

fn event_from(arg: Option<String>) -> Result<JsonValue, GuardError> {
    let raw = match arg {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    // Malformed payloads degrade to the empty event rather than failing the
    // hook; the parser substitutes sentinels.
    Ok(serde_json::from_str(&raw).unwrap_or_else(|_| json!({})))
}

pub fn run_hook_cli(project_root: &Path, cli: HookCli) -> Result<(), GuardError> {
    let mut guard = Guard::activate(project_root)?;
    let host = CliHost;

    match cli.command {
        HookCommand::Pre { event } => {
            let mut payload = event_from(event)?;
            let decision = guard.on_tool_before(&mut payload)?;
            if !decision.allow {
                return Err(GuardError::Blocked(
                    decision
                        .reason
                        .unwrap_or_else(|| "Blocked by closed-loop policy".to_string()),
                ));
            }
        }
        HookCommand::Post { event } => {
            let payload = event_from(event)?;
            guard.on_tool_after(&payload)?;
        }
        HookCommand::Idle => {
            guard.on_session_idle(&host)?;
        }
    }
    Ok(())
}

pub fn run_state_cli(project_root: &Path, cli: StateCli) -> Result<(), GuardError> {
    let cfg = config::load_config(project_root)?;
    match cli.command {
        StateCommand::Show => {
            let state = state::load_state(project_root, &cfg.state_dir);
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        StateCommand::Reset => {
            let fresh = GuardState::default();
            state::save_state(project_root, &cfg.state_dir, &fresh)?;
            println!("state reset (run_id={})", fresh.run_id);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "guard",
        "version": "0.1.0",
        "description": "Hook handlers and bounded retry loop over the validation gate",
        "hooks": ["tool.execute.before", "tool.execute.after", "session.idle"],
        "storage": [
            "guard_state.json",
            "events.jsonl",
            "tool_pre.jsonl",
            "tool_post.jsonl",
            "validation.jsonl",
            "stop_gate.jsonl"
        ]
    })
}
