use closed_loop_guard::core::config::E2eMode;
use closed_loop_guard::core::manifest::Runner;
use closed_loop_guard::plugins::gate::{
    GateOptions, GateStage, compile_triggers, primary_command, run_gate, should_run_e2e,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_manifest(dir: &Path, scripts: &[&str]) {
    let body: Vec<String> = scripts
        .iter()
        .map(|s| format!("\"{}\": \"true\"", s))
        .collect();
    fs::write(
        dir.join("package.json"),
        format!("{{\"scripts\": {{{}}}}}", body.join(", ")),
    )
    .unwrap();
}

fn options(
    dir: &Path,
    mode: E2eMode,
    touched: &[&str],
    triggers: &[&str],
) -> GateOptions {
    GateOptions {
        runner: Runner::Pnpm,
        cwd: dir.to_path_buf(),
        e2e_mode: mode,
        touched_files: touched.iter().map(|s| s.to_string()).collect(),
        e2e_triggers: compile_triggers(
            &triggers.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        ),
    }
}

#[test]
fn test_gate_is_idempotent_on_composition() {
    let tmp = tempdir().unwrap();
    write_manifest(tmp.path(), &["verify", "lint", "test"]);

    let (cmd1, stage1) = primary_command(tmp.path(), Runner::Pnpm);
    let (cmd2, stage2) = primary_command(tmp.path(), Runner::Pnpm);
    assert_eq!(cmd1, cmd2);
    assert_eq!(stage1, stage2);
    assert_eq!(stage1, GateStage::Verify);
}

#[test]
fn test_failed_gate_surfaces_command_and_output() {
    let tmp = tempdir().unwrap();
    // No manifest at all: the fallback chain runs best-guess commands that
    // cannot succeed in the sandbox.
    let res = run_gate(&options(tmp.path(), E2eMode::Never, &[], &[]));
    assert!(!res.ok);
    assert_eq!(res.stage, GateStage::Fallback);
    assert!(!res.command.is_empty());
    assert!(res.scripts_seen.is_empty());
}

#[test]
fn test_conditional_e2e_trigger_matrix() {
    let tmp = tempdir().unwrap();
    write_manifest(tmp.path(), &["verify", "e2e"]);

    // Payment touch matches the trigger.
    assert!(should_run_e2e(&options(
        tmp.path(),
        E2eMode::Conditional,
        &["src/payment/charge.ts"],
        &["payment"],
    )));

    // UI-only touch does not.
    assert!(!should_run_e2e(&options(
        tmp.path(),
        E2eMode::Conditional,
        &["src/ui/button.tsx"],
        &["payment"],
    )));

    // Trigger match without an e2e-capable script stays off.
    write_manifest(tmp.path(), &["verify"]);
    assert!(!should_run_e2e(&options(
        tmp.path(),
        E2eMode::Conditional,
        &["src/payment/charge.ts"],
        &["payment"],
    )));
}

#[test]
fn test_trigger_matching_is_case_insensitive() {
    let tmp = tempdir().unwrap();
    write_manifest(tmp.path(), &["e2e"]);
    assert!(should_run_e2e(&options(
        tmp.path(),
        E2eMode::Conditional,
        &["src/Payment/charge.ts"],
        &["payment"],
    )));
}

#[test]
fn test_never_mode_skips_e2e_even_with_triggers() {
    let tmp = tempdir().unwrap();
    write_manifest(tmp.path(), &["e2e"]);
    assert!(!should_run_e2e(&options(
        tmp.path(),
        E2eMode::Never,
        &["src/payment/charge.ts"],
        &["payment"],
    )));
}

#[test]
fn test_always_mode_ignores_touched_files() {
    let tmp = tempdir().unwrap();
    write_manifest(tmp.path(), &["e2e"]);
    assert!(should_run_e2e(&options(tmp.path(), E2eMode::Always, &[], &[])));
}
