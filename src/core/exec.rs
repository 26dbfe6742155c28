//! Synchronous shell command runner.
//!
//! Every failure mode — non-zero exit, missing binary, spawn error — is
//! folded into the returned [`ExecResult`]; callers never see an `Err`.
//! Validation gates and branch lookups both route through here.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub ok: bool,
    pub command: String,
    pub output: String,
    pub code: Option<i32>,
}

/// Runs `command` through `sh -c` in `cwd`, inheriting the caller's
/// environment, and blocks until it exits.
///
/// On success `output` is captured stdout. On failure `output` concatenates
/// stdout, stderr, and any spawn-error message, so diagnostics survive even
/// when the child produced nothing on stdout.
pub fn run(command: &str, cwd: &Path) -> ExecResult {
    match Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .output()
    {
        Ok(out) => {
            let stdout = String::from_utf8_lossy(&out.stdout).to_string();
            if out.status.success() {
                ExecResult {
                    ok: true,
                    command: command.to_string(),
                    output: stdout,
                    code: out.status.code(),
                }
            } else {
                let stderr = String::from_utf8_lossy(&out.stderr);
                ExecResult {
                    ok: false,
                    command: command.to_string(),
                    output: format!("{}{}", stdout, stderr),
                    code: out.status.code(),
                }
            }
        }
        Err(e) => ExecResult {
            ok: false,
            command: command.to_string(),
            output: e.to_string(),
            code: None,
        },
    }
}
