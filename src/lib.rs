//! closed-loop-guard: a policy-and-validation guard for coding-agent
//! sessions.
//!
//! The guard sits between a coding agent and its tools. It intercepts tool
//! invocations before they run, blocks dangerous operations, tracks which
//! files a session modified, and — when the agent goes idle — runs the
//! project's validation pipeline, feeding failures back to the agent as
//! corrective instructions until the pipeline passes or the retry budget is
//! exhausted.
//!
//! # Hook model
//!
//! Three host events drive the guard:
//!
//! - `tool.execute.before`: the policy engine classifies the call
//!   (allow/deny); denials abort the tool.
//! - `tool.execute.after`: the working-tree diff is folded into the set of
//!   touched files.
//! - `session.idle`: the validation gate runs (unified `verify` script, else
//!   a lint/typecheck/test fallback chain, with conditional e2e inclusion);
//!   failures loop the agent, repeated failures past `gate.maxCycles` ask
//!   the user.
//!
//! Hosts integrate either through the library (`plugins::guard::Guard` plus
//! a `HostSession` impl) or through the `closed-loop-guard hook` binary
//! surface, which reads event payloads as JSON and reports denials via exit
//! code.
//!
//! # Known limitation
//!
//! Bash-command classification is regex over shell text, deliberately
//! best-effort. Quoting and obfuscation defeat it; real protection belongs
//! to host-level permission configuration.
//!
//! # Crate structure
//!
//! - [`core`]: configuration, persisted state, shell runner, manifest
//!   inspection, JSONL log sinks
//! - [`plugins`]: policy engine, validation gate, hook handlers

pub mod core;
pub mod plugins;

use core::error::GuardError;
use plugins::{gate, guard, policy};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "closed-loop-guard",
    version = env!("CARGO_PKG_VERSION"),
    about = "Closed-loop validation guard for coding-agent sessions"
)]
struct Cli {
    /// Project root (defaults to the current working directory).
    #[clap(long, global = true)]
    root: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle a host hook event (pre/post/idle)
    Hook(guard::HookCli),

    /// Evaluate the tool-call policy engine
    Policy(policy::PolicyCli),

    /// Run the validation gate on demand
    Gate(gate::GateCli),

    /// Inspect or reset persisted guard state
    State(guard::StateCli),

    /// Print subsystem schemas as JSON
    Capabilities,
}

pub fn run() -> Result<(), GuardError> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let root = root
        .canonicalize()
        .map_err(|e| GuardError::PathError(format!("{}: {}", root.display(), e)))?;

    match cli.command {
        Command::Hook(hook_cli) => guard::run_hook_cli(&root, hook_cli),
        Command::Policy(policy_cli) => policy::run_policy_cli(&root, policy_cli),
        Command::Gate(gate_cli) => gate::run_gate_cli(&root, gate_cli),
        Command::State(state_cli) => guard::run_state_cli(&root, state_cli),
        Command::Capabilities => {
            let caps = serde_json::json!({
                "name": "closed-loop-guard",
                "version": env!("CARGO_PKG_VERSION"),
                "subsystems": [policy::schema(), gate::schema(), guard::schema()],
            });
            println!("{}", serde_json::to_string_pretty(&caps)?);
            Ok(())
        }
    }
}
