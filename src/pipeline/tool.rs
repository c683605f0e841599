//! External tool runner: spawn an executable, wait, capture its output.
//!
//! A non-zero exit is a normal, inspectable result here, never an error.
//! Launch failures are folded into sentinel exit codes so callers deal with
//! exactly one return shape. There are no retries at this level.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, error, info};

/// The executable could not be found.
pub const EXIT_NOT_FOUND: i32 = -1;
/// The executable was found but could not be launched or awaited.
pub const EXIT_LAUNCH_FAILED: i32 = -2;
/// The process was terminated by a signal and has no exit code.
pub const EXIT_SIGNALLED: i32 = -3;

/// Captured result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    /// Lossily decoded and trimmed.
    pub stdout: String,
    /// Lossily decoded and trimmed.
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn not_found(&self) -> bool {
        self.exit_code == EXIT_NOT_FOUND
    }

    /// stderr, or stdout when stderr is empty, or a placeholder.
    pub fn diagnostics(&self) -> &str {
        if !self.stderr.is_empty() {
            &self.stderr
        } else if !self.stdout.is_empty() {
            &self.stdout
        } else {
            "(no output)"
        }
    }

    fn launch_failure(code: i32, message: String) -> Self {
        Self {
            exit_code: code,
            stdout: String::new(),
            stderr: message,
        }
    }
}

/// Run `program` with `args` to completion.
///
/// `description` names the invocation in log lines, e.g.
/// `"pdftoppm rasterisation for 'report.pdf'"`.
pub async fn run_tool<S: AsRef<str>>(program: &str, args: &[S], description: &str) -> ToolOutput {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(command = %program, args = ?args, "Running {}", description);
    let start = Instant::now();

    let result = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    let output = match result {
        Ok(out) => out,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            error!(
                "{} failed: command not found: '{}'. Ensure it is installed and on PATH.",
                description, program
            );
            return ToolOutput::launch_failure(
                EXIT_NOT_FOUND,
                format!("Command not found: {program}"),
            );
        }
        Err(e) => {
            error!("{} failed to launch '{}': {}", description, program, e);
            return ToolOutput::launch_failure(
                EXIT_LAUNCH_FAILED,
                format!("Unexpected error running command: {e}"),
            );
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let tool_output = ToolOutput {
        exit_code: output.status.code().unwrap_or(EXIT_SIGNALLED),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if tool_output.success() {
        info!(elapsed_ms, "{} completed", description);
    } else {
        error!(
            exit_code = tool_output.exit_code,
            elapsed_ms,
            "{} failed: {}",
            description,
            tool_output.diagnostics()
        );
    }
    tool_output
}

/// Resolve `program` on `PATH` (or as a direct path).
pub fn tool_available(program: &str) -> Option<PathBuf> {
    match which::which(program) {
        Ok(path) => {
            debug!("Dependency check: '{}' found at '{}'", program, path.display());
            Some(path)
        }
        Err(_) => {
            debug!("Dependency check: '{}' not found", program);
            None
        }
    }
}
