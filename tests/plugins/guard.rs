use closed_loop_guard::core::state::{self, GuardState};
use closed_loop_guard::plugins::guard::{Guard, HostSession, IdleOutcome};
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

#[derive(Default)]
struct RecordingHost {
    logs: RefCell<Vec<String>>,
    prompts: RefCell<Vec<String>>,
}

impl HostSession for RecordingHost {
    fn app_log(&self, message: &str) {
        self.logs.borrow_mut().push(message.to_string());
    }

    fn prompt(&self, text: &str) {
        self.prompts.borrow_mut().push(text.to_string());
    }
}

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .status()
        .expect("git failed to start");
    assert!(status.success(), "git {:?} failed", args);
}

fn init_repo(dir: &Path) {
    let status = Command::new("git")
        .args(["init", "-b", "main"])
        .arg(dir)
        .status()
        .expect("git init failed to start");
    assert!(status.success());
    git(dir, &["config", "user.name", "Tester"]);
    git(dir, &["config", "user.email", "tester@example.com"]);
    fs::write(dir.join("README.md"), "hello\n").unwrap();
    git(dir, &["add", "."]);
    git(dir, &["commit", "-m", "init"]);
}

fn seed_state(root: &Path, cycle_id: u32, touched: &[&str], last_gate_ok: bool) {
    let mut s = GuardState::default();
    s.cycle_id = cycle_id;
    s.last_gate_ok = last_gate_ok;
    s.touched_files = touched.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>();
    state::save_state(root, ".opencode/state", &s).unwrap();
}

fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    match fs::read_to_string(path) {
        Ok(raw) => raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_denied_tool_call_sets_abort_and_logs_blocked() {
    let tmp = tempdir().unwrap();
    let mut guard = Guard::activate(tmp.path()).unwrap();

    let mut event = json!({
        "tool": "bash",
        "args": {"command": "sudo rm -rf /"},
        "output": {}
    });
    let decision = guard.on_tool_before(&mut event).unwrap();
    assert!(!decision.allow);

    // Abort path one: the output object carries the reason.
    let abort = event["output"]["abort"].as_str().unwrap();
    assert!(abort.contains("Blocked bash"));

    // The pre-tool sink records the decision, the events sink the block.
    let pre = read_jsonl(&tmp.path().join(".opencode/logs/tool_pre.jsonl"));
    assert_eq!(pre.len(), 1);
    assert_eq!(pre[0]["decision"]["allow"], false);

    let events = read_jsonl(&tmp.path().join(".opencode/logs/events.jsonl"));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "blocked");
    assert_eq!(events[0]["tool"], "bash");
}

#[test]
fn test_allowed_tool_call_leaves_event_untouched() {
    let tmp = tempdir().unwrap();
    let mut guard = Guard::activate(tmp.path()).unwrap();

    let mut event = json!({
        "tool": "bash",
        "args": {"command": "cargo test"},
        "output": {}
    });
    let decision = guard.on_tool_before(&mut event).unwrap();
    assert!(decision.allow);
    assert!(event["output"].get("abort").is_none());

    let events = read_jsonl(&tmp.path().join(".opencode/logs/events.jsonl"));
    assert!(events.is_empty());
}

#[test]
fn test_post_tool_records_touched_files_from_git() {
    let tmp = tempdir().unwrap();
    init_repo(tmp.path());
    // Modify a tracked file so `git diff --name-only` reports it.
    fs::write(tmp.path().join("README.md"), "changed\n").unwrap();

    let mut guard = Guard::activate(tmp.path()).unwrap();
    guard
        .on_tool_after(&json!({"tool": "edit", "args": {}}))
        .unwrap();

    assert!(guard.state().touched_files.contains("README.md"));

    // And it survives a restart.
    let reloaded = state::load_state(tmp.path(), ".opencode/state");
    assert!(reloaded.touched_files.contains("README.md"));

    let post = read_jsonl(&tmp.path().join(".opencode/logs/tool_post.jsonl"));
    assert_eq!(post.len(), 1);
    assert_eq!(post[0]["event"], "tool.execute.after");
}

#[test]
fn test_post_tool_outside_git_is_a_noop_on_touched() {
    let tmp = tempdir().unwrap();
    let mut guard = Guard::activate(tmp.path()).unwrap();
    guard.on_tool_after(&json!({"tool": "edit"})).unwrap();
    assert!(guard.state().touched_files.is_empty());
}

#[test]
fn test_idle_skips_cleanly_when_nothing_changed() {
    let tmp = tempdir().unwrap();
    let mut guard = Guard::activate(tmp.path()).unwrap();
    let host = RecordingHost::default();

    let outcome = guard.on_session_idle(&host).unwrap();
    assert_eq!(outcome, IdleOutcome::Skipped);

    // No gate execution, no log entries, no prompts.
    assert!(read_jsonl(&tmp.path().join(".opencode/logs/validation.jsonl")).is_empty());
    assert!(read_jsonl(&tmp.path().join(".opencode/logs/stop_gate.jsonl")).is_empty());
    assert!(host.prompts.borrow().is_empty());
}

#[test]
fn test_idle_failure_increments_cycle_and_prompts_correction() {
    let tmp = tempdir().unwrap();
    seed_state(tmp.path(), 0, &["src/a.ts"], false);

    let mut guard = Guard::activate(tmp.path()).unwrap();
    let host = RecordingHost::default();
    let outcome = guard.on_session_idle(&host).unwrap();

    assert_eq!(outcome, IdleOutcome::Retry { attempt: 1, max: 5 });
    assert_eq!(guard.state().cycle_id, 1);
    assert!(!guard.state().last_gate_ok);

    let prompts = host.prompts.borrow();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("attempt 1/5"));
    assert!(prompts[0].contains("Do NOT claim completion"));

    // start + fail records in the stop-gate sink, one validation record.
    let stop = read_jsonl(&tmp.path().join(".opencode/logs/stop_gate.jsonl"));
    assert_eq!(stop.len(), 2);
    assert_eq!(stop[0]["event"], "stop_gate.start");
    assert_eq!(stop[1]["event"], "stop_gate.fail");

    let val = read_jsonl(&tmp.path().join(".opencode/logs/validation.jsonl"));
    assert_eq!(val.len(), 1);
    assert_eq!(val[0]["ok"], false);
}

#[test]
fn test_repeated_idle_failures_escalate_past_budget() {
    let tmp = tempdir().unwrap();
    seed_state(tmp.path(), 5, &["src/a.ts"], false);

    let mut guard = Guard::activate(tmp.path()).unwrap();
    let host = RecordingHost::default();
    let outcome = guard.on_session_idle(&host).unwrap();

    assert_eq!(outcome, IdleOutcome::Escalated { attempts: 5 });
    assert_eq!(guard.state().cycle_id, 6);

    let prompts = host.prompts.borrow();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("keeps failing after 5 attempts"));
    assert!(prompts[0].contains("decide next steps"));
}

#[test]
fn test_idle_runs_gate_after_edits_even_if_last_gate_passed() {
    let tmp = tempdir().unwrap();
    seed_state(tmp.path(), 0, &["src/a.ts"], true);

    let mut guard = Guard::activate(tmp.path()).unwrap();
    let host = RecordingHost::default();
    let outcome = guard.on_session_idle(&host).unwrap();

    // Touched files force a gate run; with no runnable scripts it fails.
    assert_eq!(outcome, IdleOutcome::Retry { attempt: 1, max: 5 });
}
