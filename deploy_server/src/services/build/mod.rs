//! Isolated builds: turn a source tree into an artifact directory.
//!
//! The orchestrator only sees [`BuildStrategy`]; toolchains plug in behind it.

pub mod docker;

use std::path::Path;

use async_trait::async_trait;

use crate::error::{BuildError, ProcessError};

pub use docker::DockerBuildStrategy;

/// Name of the artifact directory a build leaves in the workspace root.
pub const ARTIFACT_DIR: &str = "dist";

#[async_trait]
pub trait BuildStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Build `workspace` and leave the artifacts in `workspace/dist`.
    ///
    /// `tag` is unique per job and names every host resource the build
    /// creates. Fails fast on the first failing step.
    async fn build(&self, workspace: &Path, tag: &str) -> Result<(), BuildError>;

    /// Release every host resource created under `tag`.
    ///
    /// Called by the orchestrator after each job, whatever its outcome.
    async fn discard(&self, tag: &str) -> Result<(), ProcessError>;
}
