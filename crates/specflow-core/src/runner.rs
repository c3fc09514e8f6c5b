//! Subprocess runner shared by the git and code-hosting collaborators.
//!
//! Centralizes spawning, logging and error mapping so every external call
//! reports the same structured `Command` error on failure.

use crate::error::{Result, SpecflowError};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Locate `program` on PATH.
pub fn require(program: &str) -> Result<PathBuf> {
    which::which(program).map_err(|_| SpecflowError::ToolMissing {
        program: program.to_string(),
    })
}

/// Run `program args...` in `dir` and return the raw output.
pub fn run(program: &str, args: &[&str], dir: &Path) -> Result<Output> {
    tracing::debug!(dir = %dir.display(), "{program} {}", args.join(" "));
    Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SpecflowError::ToolMissing {
                program: program.to_string(),
            },
            _ => SpecflowError::Io(e),
        })
}

/// Run a command, require a zero exit and return trimmed stdout.
pub fn run_checked(program: &str, args: &[&str], dir: &Path) -> Result<String> {
    let output = run(program, args, dir)?;
    if !output.status.success() {
        return Err(command_error(program, args, &output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run a command and report only whether it exited zero.
///
/// Spawn failures still surface as errors; only the exit status is folded
/// into the boolean.
pub fn run_bool(program: &str, args: &[&str], dir: &Path) -> Result<bool> {
    Ok(run(program, args, dir)?.status.success())
}

pub fn command_error(program: &str, args: &[&str], output: &Output) -> SpecflowError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stderr = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    };
    SpecflowError::Command {
        command: format!("{program} {}", args.join(" ")),
        stderr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_program_is_reported_as_tool_missing() {
        let dir = TempDir::new().unwrap();
        let err = run("specflow-definitely-not-installed", &[], dir.path()).unwrap_err();
        assert!(matches!(err, SpecflowError::ToolMissing { .. }));
    }

    #[test]
    fn require_names_the_missing_program() {
        match require("specflow-definitely-not-installed") {
            Err(SpecflowError::ToolMissing { program }) => {
                assert_eq!(program, "specflow-definitely-not-installed");
            }
            other => panic!("expected ToolMissing, got {other:?}"),
        }
    }
}
