//! Operations utilities around the reports: scheduling, Git sync, secret
//! migration, certificates and Google Drive publishing.

pub mod cert;
pub mod drive;
pub mod git_sync;
pub mod schedule;
pub mod secrets;

use crate::error::{M365Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a finished external program
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an external program to completion, optionally feeding it stdin.
///
/// A non-zero exit becomes [`M365Error::CommandFailed`] carrying stderr, so
/// callers that retry get the program's own message classified.
pub async fn run_command(
    program: impl AsRef<Path>,
    args: &[&str],
    cwd: Option<&Path>,
    stdin: Option<&[u8]>,
) -> Result<CommandOutput> {
    let output = execute(program.as_ref(), args, cwd, stdin).await?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Raw stdout bytes, for programs that emit binary (DER certificates,
/// signatures)
pub async fn run_command_bytes(
    program: &str,
    args: &[&str],
    stdin: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let output = execute(Path::new(program), args, None, stdin).await?;
    Ok(output.stdout)
}

async fn execute(
    program: &Path,
    args: &[&str],
    cwd: Option<&Path>,
    stdin: Option<&[u8]>,
) -> Result<std::process::Output> {
    let name = program.display().to_string();
    debug!(program = %name, ?args, "Running external command");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            M365Error::ConfigError(format!("'{}' was not found on PATH", name))
        } else {
            M365Error::IoError(e)
        }
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input).await?;
            // Closing stdin lets programs reading to EOF finish
            drop(pipe);
        }
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".into());
        return Err(M365Error::CommandFailed {
            program: name,
            code,
            stderr: if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            },
        });
    }

    Ok(output)
}
