//! Process runner: executes external commands to completion.
//!
//! Used by source acquisition and the container build. Commands never
//! inherit stdin, run in their own process group, and are killed together
//! with their descendants if the caller stops waiting (deadline expiry or a
//! cancelled pipeline).

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::ProcessError;

/// Keep at most this many bytes of captured stderr.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Runs commands with an optional per-command deadline.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    timeout: Option<Duration>,
}

impl CommandRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Run `program` with `args`, returning stdout on exit code zero.
    ///
    /// A non-zero exit yields [`ProcessError::Failed`] carrying stderr. No
    /// retries are attempted.
    pub async fn run<I, S>(&self, program: &str, args: I) -> Result<String, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        tracing::debug!(program, command = ?command.as_std(), "Spawning command");

        let child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let mut guard = ProcessGroupGuard::new(child.id());

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(program, timeout_secs = limit.as_secs(), "Command timed out");
                    return Err(ProcessError::TimedOut {
                        program: program.to_string(),
                        limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;
        guard.disarm();

        if !output.status.success() {
            let stderr = truncate_tail(String::from_utf8_lossy(&output.stderr).into_owned());
            return Err(ProcessError::Failed {
                program: program.to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Kills the child's process group on drop unless disarmed.
struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_process_group(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) has no memory-safety preconditions. The group was
    // created for this child; ESRCH after it exited is ignored.
    unsafe {
        libc::kill(-pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn truncate_tail(text: String) -> String {
    if text.len() <= MAX_STDERR_BYTES {
        return text;
    }
    let mut start = text.len() - MAX_STDERR_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...truncated...\n{}", &text[start..])
}
