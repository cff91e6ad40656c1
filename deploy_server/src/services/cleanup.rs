//! Workspace removal with an elevated fallback.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use async_trait::async_trait;

use crate::error::CleanupError;
use crate::services::process::CommandRunner;

/// Releases a job workspace from the host.
#[async_trait]
pub trait WorkspaceRemover: Send + Sync {
    /// Remove `path` recursively. A path that does not exist is already clean.
    async fn remove_workspace(&self, path: &Path) -> Result<(), CleanupError>;
}

/// Removes job workspaces, retrying once through an elevated command when
/// the build left files the service user cannot delete.
#[derive(Debug, Clone)]
pub struct WorkspaceCleaner {
    runner: CommandRunner,
    elevated_program: String,
    elevated_args: Vec<OsString>,
}

impl WorkspaceCleaner {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            elevated_program: "sudo".to_string(),
            elevated_args: ["-n", "rm", "-rf", "--"].map(OsString::from).to_vec(),
        }
    }

    /// Replace the elevated removal command; the path is appended last.
    pub fn with_elevated_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.elevated_program = program.into();
        self.elevated_args = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        self
    }
}

#[async_trait]
impl WorkspaceRemover for WorkspaceCleaner {
    async fn remove_workspace(&self, path: &Path) -> Result<(), CleanupError> {
        let first = match tokio::fs::remove_dir_all(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => e,
        };

        tracing::warn!(path = %path.display(), "Workspace removal failed ({first}), retrying elevated");

        let mut args = self.elevated_args.clone();
        args.push(path.as_os_str().to_os_string());
        self.runner
            .run(&self.elevated_program, args)
            .await
            .map_err(|e| CleanupError::Workspace {
                path: path.to_path_buf(),
                message: format!("{first}; elevated removal failed: {e}"),
            })?;

        Ok(())
    }
}
