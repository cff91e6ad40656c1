//! Source acquisition: clones a remote repository into a job workspace.

use std::ffi::OsStr;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{DeployError, DeployResult};
use crate::services::process::CommandRunner;

/// Populates a fresh workspace directory with project sources.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch `url` into `dest`, which must not exist yet.
    async fn fetch(&self, url: &str, dest: &Path) -> DeployResult<()>;
}

/// Full `git clone` through the process runner.
#[derive(Debug, Clone)]
pub struct GitSource {
    runner: CommandRunner,
    git_bin: String,
}

impl GitSource {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            git_bin: "git".to_string(),
        }
    }

    pub fn with_git_bin(mut self, git_bin: impl Into<String>) -> Self {
        self.git_bin = git_bin.into();
        self
    }
}

#[async_trait]
impl SourceFetcher for GitSource {
    async fn fetch(&self, url: &str, dest: &Path) -> DeployResult<()> {
        tracing::info!(url, dest = %dest.display(), "Cloning repository");

        self.runner
            .run(&self.git_bin, clone_args(url, dest))
            .await
            .map_err(|source| DeployError::Clone {
                url: url.to_string(),
                source,
            })?;

        tracing::info!(dest = %dest.display(), "Clone complete");
        Ok(())
    }
}

/// Arguments for a full clone. `--` keeps a caller-supplied URL from being
/// parsed as an option.
fn clone_args<'a>(url: &'a str, dest: &'a Path) -> [&'a OsStr; 5] {
    [
        OsStr::new("clone"),
        OsStr::new("--quiet"),
        OsStr::new("--"),
        OsStr::new(url),
        dest.as_os_str(),
    ]
}
