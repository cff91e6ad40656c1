//! Error types for the deployment pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::job::{JobId, JobState};

/// Failure of an external command run through the process runner.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited non-zero.
    #[error("{program} exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The program exceeded its deadline and was killed.
    #[error("{program} timed out after {limit:?}")]
    TimedOut { program: String, limit: Duration },
}

/// Which external step of a containerized build failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Image,
    CreateContainer,
    CopyArtifacts,
    RemoveContainer,
}

impl std::fmt::Display for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image build"),
            Self::CreateContainer => write!(f, "container create"),
            Self::CopyArtifacts => write!(f, "artifact copy"),
            Self::RemoveContainer => write!(f, "container remove"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    /// The build descriptor could not be written into the workspace.
    #[error("failed to write build descriptor {path}: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} failed: {source}")]
    Step {
        step: BuildStep,
        #[source]
        source: ProcessError,
    },

    /// The build reported success but left no artifact directory behind.
    #[error("artifact directory not found: {0}")]
    MissingArtifacts(PathBuf),

    #[error("artifact directory contains no files: {0}")]
    EmptyArtifacts(PathBuf),
}

#[derive(Debug, Error)]
pub enum UploadError {
    /// Walking the artifact tree failed.
    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// The blocking scan task panicked or was cancelled.
    #[error("scan of {path} did not complete: {message}")]
    ScanAborted { path: PathBuf, message: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to upload {key} to bucket {bucket}: {source}")]
    Put {
        key: String,
        bucket: String,
        #[source]
        source: object_store::Error,
    },
}

/// Non-fatal failure while releasing a job's host resources.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to remove workspace {path}: {message}")]
    Workspace { path: PathBuf, message: String },

    #[error("failed to remove image {image}: {source}")]
    Image {
        image: String,
        #[source]
        source: ProcessError,
    },
}

/// Errors that abort a deployment pipeline.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to prepare workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: ProcessError,
    },

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("pipeline timed out after {limit:?}")]
    TimedOut { limit: Duration },

    #[error("internal error: {0}")]
    Internal(String),
}

/// A failed deployment, with the stage it failed in.
#[derive(Debug, Error)]
#[error("deployment {job_id} failed while {stage}: {error}")]
pub struct DeployFailure {
    pub job_id: JobId,
    pub stage: JobState,
    #[source]
    pub error: DeployError,
}

pub type DeployResult<T> = Result<T, DeployError>;
